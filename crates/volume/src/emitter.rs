//! Emission of the EDK-II rebuild description out of parsed file records.
//!
//! The emitter makes two read-only passes over the [`UefiImage`] records. The
//! first writes every module's artifacts and collects the `DXE.inc` load list
//! and `DXE.dsc.inc` include list; the second re-derives the same module
//! paths and writes the `APRIORI.inc` load-order list for the files named by
//! the image's a-priori GUID set. Both passes lean on
//! [`derive_module_paths`], so they agree on naming by construction.
//!
//! Module names are not stored in the volume; they are recovered from the
//! `.dll` build paths the toolchain leaves behind inside executable sections,
//! e.g. `Build/Target/ARM/Driver/DEBUG/Mod.dll` names module `Driver`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::bytes::Regex;
use snafu::prelude::*;
use uefireader_core::time;

use crate::error::{FileConflictSnafu, Result};
use crate::file::FirmwareFile;
use crate::image::UefiImage;
use crate::section::{Section, SectionKind};

/// Matches the build paths compilers leave inside executable sections.
fn path_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[A-Za-z0-9/\\_\-.]*\.dll\b").unwrap())
}

/// Matches the Qualcomm build tag embedded in the raw image.
fn build_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"QC_IMAGE_VERSION_STRING=[A-Za-z0-9/\\_\-.]*\b").unwrap())
}

/// Returns the first Qualcomm build tag in the image, if any.
pub(crate) fn find_build_id(data: &[u8]) -> Option<String> {
    build_id_regex().find(data).map(|found| {
        let text = &found.as_bytes()["QC_IMAGE_VERSION_STRING=".len()..];
        // The character class is pure ASCII, so UTF-8 validation cannot fail
        String::from_utf8(text.to_vec()).unwrap()
    })
}

/// Writes the full rebuild description for `image` under `output`, or under
/// `output/<build id>` when the image carries a build tag.
pub(crate) fn extract(image: &UefiImage, output: &Path) -> Result<()> {
    let root = match image.build_id().is_empty() {
        true => output.to_path_buf(),
        false => output.join(image.build_id()),
    };
    std::fs::create_dir_all(&root)?;

    extract_modules(image, &root)?;
    extract_apriori(image, &root)?;
    Ok(())
}

/// The module identity shared by both emitter passes.
struct ModulePaths {
    module_name: String,
    output_path: String,
    base_name: String,
}

impl ModulePaths {
    /// Path of the module description relative to the output root, always
    /// `/`-separated since it lands in the list files.
    fn inf_relative(&self) -> String {
        match self.output_path.is_empty() {
            true => format!("{}.inf", self.module_name),
            false => format!("{}/{}.inf", self.output_path, self.module_name),
        }
    }
}

/// Derives where a file's artifacts belong. Returns `None` for files without
/// any path-capable section (raw blobs and UI-only freeform files), which the
/// emitter handles separately.
fn derive_module_paths(file: &FirmwareFile) -> Result<Option<ModulePaths>> {
    let path_sections: Vec<&Section> =
        file.sections.iter().filter(|section| section.kind().carries_path()).collect();
    if path_sections.is_empty() {
        return Ok(None);
    }

    let first_path = path_sections
        .iter()
        .flat_map(|section| section_paths(section.body()))
        .next();
    let ui_name = file.ui_section()?.and_then(Section::name);

    let mut module_name = String::new();
    let mut output_path = String::new();
    let mut base_name = String::new();

    if let Some(path) = first_path {
        // The two-separator filter guarantees at least three components
        let parts: Vec<&str> = path.split('/').collect();
        module_name = parts[parts.len() - 3].to_string();
        output_path = parts[..parts.len() - 3].join("/");
        base_name = ui_name.unwrap_or(&module_name).to_string();
    } else if let Some(name) = ui_name {
        base_name = name.to_string();
        module_name = name.replace(' ', "_");
        output_path = module_name.clone();
    }

    Ok(Some(ModulePaths { module_name, output_path, base_name }))
}

/// All normalized build paths in one section body, in match order.
fn section_paths(body: &[u8]) -> Vec<String> {
    path_regex()
        .find_iter(body)
        .map(|found| {
            // The character class is pure ASCII, so UTF-8 validation cannot fail
            normalize_build_path(core::str::from_utf8(found.as_bytes()).unwrap())
        })
        .filter(|path| path.matches('/').count() > 1)
        .collect()
}

/// Reduces a raw build path to its architecture-relative tail: everything
/// after the last `/ARM/` or `/AARCH64/` segment, with backslashes folded to
/// forward slashes.
fn normalize_build_path(path: &str) -> String {
    if path.contains("ARM") {
        let replaced = path.replace('\\', "/");
        match replaced.rsplit_once("/ARM/") {
            Some((_, tail)) => tail.to_string(),
            None => path.to_string(),
        }
    } else if path.contains("AARCH64") {
        let replaced = path.replace('\\', "/");
        match replaced.rsplit_once("/AARCH64/") {
            Some((_, tail)) => tail.to_string(),
            None => path.to_string(),
        }
    } else {
        path.replace('\\', "/")
    }
}

/// Converts a `/`-separated output path into a real directory under `root`.
fn output_dir(root: &Path, output_path: &str) -> PathBuf {
    output_path
        .split('/')
        .filter(|component| !component.is_empty())
        .fold(root.to_path_buf(), |dir, component| dir.join(component))
}

/// First pass: module artifacts plus the load and include lists.
fn extract_modules(image: &UefiImage, root: &Path) -> Result<()> {
    let mut load_list: Vec<String> = Vec::new();
    let mut include_list: Vec<String> = Vec::new();

    for file in image.files() {
        match derive_module_paths(file)? {
            Some(paths) => {
                emit_module(file, &paths, root, &mut load_list, &mut include_list)?;
            }
            None => match file.ui_section()? {
                Some(ui) => emit_freeform(file, ui, root, &mut load_list)?,
                None => emit_raw_blobs(file, root)?,
            },
        }
    }

    std::fs::write(root.join("DXE.dsc.inc"), include_list.join("\n"))?;
    std::fs::write(root.join("DXE.inc"), load_list.join("\n"))?;
    Ok(())
}

/// Second pass: the a-priori load-order list.
fn extract_apriori(image: &UefiImage, root: &Path) -> Result<()> {
    let mut load_list = vec![String::from("APRIORI DXE {")];

    for file in image.files() {
        let Some(paths) = derive_module_paths(file)? else {
            continue;
        };
        if image.load_priority().contains(&file.guid) {
            load_list.push(format!("    INF {}", paths.inf_relative()));
        }
    }

    load_list.push(String::from("}"));
    std::fs::write(root.join("APRIORI.inc"), load_list.join("\n"))?;
    Ok(())
}

/// Writes one module: each non-UI section body under its own extension, plus
/// the generated `.inf` describing them.
fn emit_module(
    file: &FirmwareFile,
    paths: &ModulePaths,
    root: &Path,
    load_list: &mut Vec<String>,
    include_list: &mut Vec<String>,
) -> Result<()> {
    let module_dir = output_dir(root, &paths.output_path);
    std::fs::create_dir_all(&module_dir)?;

    let has_depex = file.sections.iter().any(|section| section.kind() == SectionKind::DxeDepex);

    let mut inf = String::new();
    inf.push_str(
        "# ****************************************************************************\n",
    );
    inf.push_str("# AUTOGENERATED BY UEFIReader\n");
    let _ = writeln!(inf, "# AUTOGENED AS {}.inf", paths.module_name);
    inf.push_str("# DO NOT MODIFY\n");
    let _ = writeln!(inf, "# GENERATED ON: {}Z", time::utc_timestamp());
    inf.push_str("\n[Defines]\n");
    inf.push_str("  INF_VERSION    = 0x0001001B\n");
    let _ = writeln!(inf, "  BASE_NAME      = {}", paths.base_name);
    let _ = writeln!(inf, "  FILE_GUID      = {}", file.guid);
    let _ = writeln!(inf, "  MODULE_TYPE    = {}", file.kind.module_type());
    inf.push_str("  VERSION_STRING = 1.0\n");
    if has_depex {
        inf.push_str("  ENTRY_POINT    = EfiEntry\n");
    }
    inf.push_str("\n[Binaries.AARCH64]");

    for section in &file.sections {
        if section.kind() == SectionKind::Ui {
            continue;
        }
        let file_name = format!("{}.{}", paths.module_name, section.kind().extension());
        let _ = write!(inf, "\n   {}|{}|*", section.kind().name(), file_name);

        let target = module_dir.join(&file_name);
        ensure!(!target.exists(), FileConflictSnafu { path: target.clone() });
        std::fs::write(&target, section.body())?;
        log::info!("Wrote {}", target.display());
    }

    inf.push_str("\n\n");
    if has_depex {
        inf.push_str("[Depex]\n  TRUE\n");
    }
    inf.push_str("# AUTOGEN ENDS\n");
    inf.push_str(
        "# ****************************************************************************\n",
    );

    std::fs::write(module_dir.join(format!("{}.inf", paths.module_name)), inf)?;

    let relative = paths.inf_relative();
    load_list.push(format!("INF {relative}"));
    include_list.push(relative);
    Ok(())
}

/// Writes a UI-named freeform file as a FREEFORM stanza in the load list, its
/// raw bodies landing under `RawFiles/`.
fn emit_freeform(
    file: &FirmwareFile,
    ui: &Section,
    root: &Path,
    load_list: &mut Vec<String>,
) -> Result<()> {
    let ui_name = ui.name().unwrap_or_default();
    let file_name = ui_name.replace(' ', "_");

    load_list.push(String::new());
    load_list.push(format!("FILE FREEFORM = {} {{", file.guid));

    for section in &file.sections {
        match section.kind() {
            SectionKind::Raw => {
                let target = output_dir(&root.join("RawFiles"), &file_name);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, section.body())?;
                log::info!("Wrote {}", target.display());
                load_list.push(format!("    SECTION RAW = RawFiles/{file_name}"));
            }
            SectionKind::Ui => {
                load_list.push(format!("    SECTION UI  = \"{}\"", section.name().unwrap_or(ui_name)));
            }
            _ => {}
        }
    }

    load_list.push(String::from("}"));
    load_list.push(String::new());
    Ok(())
}

/// Writes the raw bodies of a file nothing else references, named by its
/// GUID. These never show up in the load list.
fn emit_raw_blobs(file: &FirmwareFile, root: &Path) -> Result<()> {
    let file_name = file.guid.to_string().to_lowercase();

    for section in &file.sections {
        if section.kind() != SectionKind::Raw {
            continue;
        }
        let directory = root.join("RawFiles");
        std::fs::create_dir_all(&directory)?;
        let target = directory.join(&file_name);
        std::fs::write(&target, section.body())?;
        log::info!("Wrote {}", target.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use uefireader_core::guid::Guid;

    use super::*;
    use crate::file::FileKind;
    use crate::section::Section;

    fn driver_with(sections: Vec<Section>) -> FirmwareFile {
        FirmwareFile {
            guid: Guid::from_bytes([0x11; 16]),
            kind: FileKind::Driver,
            sections,
        }
    }

    #[test]
    fn normalizes_architecture_paths() {
        assert_eq!(
            normalize_build_path(r"Build\Target\ARM\Driver\DEBUG\Mod.dll"),
            "Driver/DEBUG/Mod.dll"
        );
        assert_eq!(
            normalize_build_path("Out/AARCH64/Core/DEBUG/Core.dll"),
            "Core/DEBUG/Core.dll"
        );
        assert_eq!(
            normalize_build_path(r"Plain\Path\Mod.dll"),
            "Plain/Path/Mod.dll"
        );
        // ARM as a bare substring without a path segment is left alone
        assert_eq!(normalize_build_path("ArmPkg.dll"), "ArmPkg.dll");
    }

    #[test]
    fn extracts_paths_with_enough_separators() {
        let body = b"junk Foo/Bar/ARM/Baz/Qux/Mod.dll more Short.dll junk";
        let paths = section_paths(body);
        assert_eq!(paths, ["Baz/Qux/Mod.dll"]);
    }

    #[test]
    fn derives_module_identity_from_the_first_path() {
        let body =
            b"\0Build/Target/ARM/QcomPkg/Drivers/FooDxe/FooDxe/DEBUG/FooDxe.dll\0A/B/C/D/E.dll\0";
        let file = driver_with(vec![Section::new(SectionKind::Pe32, body.to_vec())]);
        let paths = derive_module_paths(&file).unwrap().unwrap();
        assert_eq!(paths.module_name, "FooDxe");
        assert_eq!(paths.output_path, "QcomPkg/Drivers/FooDxe");
        assert_eq!(paths.base_name, "FooDxe");
        assert_eq!(paths.inf_relative(), "QcomPkg/Drivers/FooDxe/FooDxe.inf");
    }

    #[test]
    fn short_paths_land_in_the_output_root() {
        // Three components leave nothing in front of the module name
        let file = driver_with(vec![Section::new(
            SectionKind::Pe32,
            b"\0Foo/Bar/ARM/Baz/Qux/Mod.dll\0".to_vec(),
        )]);
        let paths = derive_module_paths(&file).unwrap().unwrap();
        assert_eq!(paths.module_name, "Baz");
        assert_eq!(paths.output_path, "");
        assert_eq!(paths.inf_relative(), "Baz.inf");
    }

    #[test]
    fn ui_name_beats_module_name_for_base_name() {
        let body = b"\0Build/Target/ARM/QcomPkg/Drivers/FooDxe/FooDxe/DEBUG/FooDxe.dll\0";
        let file = driver_with(vec![
            Section::new(SectionKind::Pe32, body.to_vec()),
            ui_section("MyDriver"),
        ]);
        let paths = derive_module_paths(&file).unwrap().unwrap();
        assert_eq!(paths.base_name, "MyDriver");
        assert_eq!(paths.module_name, "FooDxe");
    }

    #[test]
    fn falls_back_to_the_ui_name() {
        let file = driver_with(vec![
            Section::new(SectionKind::Pe32, b"no paths in here".to_vec()),
            ui_section("Some App"),
        ]);
        let paths = derive_module_paths(&file).unwrap().unwrap();
        assert_eq!(paths.module_name, "Some_App");
        assert_eq!(paths.output_path, "Some_App");
        assert_eq!(paths.base_name, "Some App");
    }

    #[test]
    fn refuses_duplicate_ui_sections() {
        let file = driver_with(vec![
            Section::new(SectionKind::Pe32, Vec::new()),
            ui_section("One"),
            ui_section("Two"),
        ]);
        assert!(derive_module_paths(&file).is_err());
    }

    #[test]
    fn finds_the_first_build_id() {
        let data = b"..QC_IMAGE_VERSION_STRING=BOOT.XF.1.0-12345\0..QC_IMAGE_VERSION_STRING=OTHER..";
        assert_eq!(find_build_id(data).as_deref(), Some("BOOT.XF.1.0-12345"));
        assert_eq!(find_build_id(b"nothing"), None);
    }

    #[test]
    fn refuses_to_overwrite_module_artifacts() {
        let output = tempfile::tempdir().unwrap();
        let file = driver_with(vec![Section::new(
            SectionKind::Pe32,
            b"\0Build/Target/ARM/QcomPkg/Drivers/FooDxe/FooDxe/DEBUG/FooDxe.dll\0".to_vec(),
        )]);
        let paths = derive_module_paths(&file).unwrap().unwrap();

        let mut load_list = Vec::new();
        let mut include_list = Vec::new();
        emit_module(&file, &paths, output.path(), &mut load_list, &mut include_list).unwrap();
        assert_eq!(load_list, ["INF QcomPkg/Drivers/FooDxe/FooDxe.inf"]);
        assert!(output.path().join("QcomPkg/Drivers/FooDxe/FooDxe.efi").exists());

        // A second emission of the same module must not clobber the first
        assert!(matches!(
            emit_module(&file, &paths, output.path(), &mut load_list, &mut include_list),
            Err(crate::error::Error::FileConflict { .. })
        ));
    }

    fn ui_section(name: &str) -> Section {
        Section::named(SectionKind::Ui, name.to_string(), Vec::new())
    }
}
