use argp::FromArgs;

/// Rebuild EDK-II module descriptions out of a Qualcomm UEFI/XBL firmware
/// image: per-module .inf files plus the DXE.inc, DXE.dsc.inc and APRIORI.inc
/// index lists.
#[derive(FromArgs, Debug)]
pub struct UefiReader {
    /// Print more details. Pass multiple times for more verbosity.
    #[argp(switch, short = 'v')]
    pub verbose: u8,

    /// Path to the UEFI/XBL image to parse.
    #[argp(positional)]
    pub input: String,

    /// Directory to write the build description into.
    #[argp(positional)]
    pub output: String,
}
