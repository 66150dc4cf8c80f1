use crate::host::AutomationHost;
use crate::models::{BatchReport, BatchResults};
use crate::services::conversion::Converter;
use crate::services::system::HostSystem;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// What a batch run should convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRequest {
    /// Every file in `folder` matching `pattern`
    Folder {
        folder: Utf8PathBuf,
        output_dir: Option<Utf8PathBuf>,
        pattern: String,
    },
    /// Paths listed in a JSON array file
    List {
        list_file: Utf8PathBuf,
        output_dir: Option<Utf8PathBuf>,
    },
}

/// Run a batch and persist its report in `report_dir`.
///
/// Per-file failures are recorded in the report; an error here means the batch
/// itself could not run or its report could not be written.
pub async fn run_batch<H: AutomationHost, S: HostSystem>(
    converter: Converter<H, S>,
    request: &BatchRequest,
    report_dir: &Utf8Path,
) -> Result<(BatchReport, Utf8PathBuf)> {
    tracing::info!("=== Starting batch processing ===");

    let results = match request {
        BatchRequest::Folder {
            folder,
            output_dir,
            pattern,
        } => process_folder(converter, folder, output_dir.as_deref(), pattern).await?,
        BatchRequest::List {
            list_file,
            output_dir,
        } => process_file_list(converter, list_file, output_dir.as_deref()).await?,
    };

    let report = BatchReport::new(results);
    report.log_summary();
    let path = report.write_to(report_dir)?;

    Ok((report, path))
}

/// Convert every file in `folder` matching the glob `pattern`.
///
/// Outputs go to `output_dir`, or to the configured subdirectory of `folder`
/// (`pdf_output` by default). A missing folder or an empty match set yields an
/// empty result without creating any output directory.
pub async fn process_folder<H: AutomationHost, S: HostSystem>(
    converter: Converter<H, S>,
    folder: &Utf8Path,
    output_dir: Option<&Utf8Path>,
    pattern: &str,
) -> Result<BatchResults> {
    if !folder.is_dir() {
        tracing::error!("Folder not found: {}", folder);
        return Ok(BatchResults::new());
    }

    let files = find_matching_files(folder, pattern)?;
    tracing::info!("Found {} Excel files", files.len());

    if files.is_empty() {
        tracing::warn!("No Excel files found in {} matching {}", folder, pattern);
        return Ok(BatchResults::new());
    }

    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => folder.join(&converter.settings().batch.output_subdir),
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output folder: {}", output_dir))?;

    Ok(converter
        .scoped(async |c| c.convert_batch(&files, Some(output_dir.as_path())).await)
        .await)
}

/// Convert the files listed in a JSON array.
///
/// An unreadable or malformed list is logged and yields an empty result.
pub async fn process_file_list<H: AutomationHost, S: HostSystem>(
    converter: Converter<H, S>,
    list_file: &Utf8Path,
    output_dir: Option<&Utf8Path>,
) -> Result<BatchResults> {
    let files = match load_file_list(list_file) {
        Ok(files) => files,
        Err(e) => {
            tracing::error!("Error loading file list: {:#}", e);
            return Ok(BatchResults::new());
        }
    };
    tracing::info!("Loaded {} entries from {}", files.len(), list_file);

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output folder: {}", dir))?;
    }

    Ok(converter
        .scoped(async |c| c.convert_batch(&files, output_dir).await)
        .await)
}

/// Read a JSON array of file paths
pub fn load_file_list(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file list: {}", path))?;

    let entries: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("File list is not a JSON array of paths: {}", path))?;

    Ok(entries.into_iter().map(Utf8PathBuf::from).collect())
}

/// Regular files in `folder` matching `pattern`, sorted by path.
///
/// Matching ignores case, as Windows file names do.
pub fn find_matching_files(folder: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>> {
    let full_pattern = Utf8Path::new(&glob::Pattern::escape(folder.as_str())).join(pattern);
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };
    let entries = glob::glob_with(full_pattern.as_str(), options)
        .with_context(|| format!("Invalid file pattern: {}", pattern))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !path.is_file() {
            continue;
        }

        match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => files.push(path),
            Err(path) => tracing::warn!("Skipping non UTF-8 path: {}", path.display()),
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_path() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, path)
    }

    #[test]
    fn test_find_matching_files() {
        let (_temp_dir, dir) = temp_path();
        fs::write(dir.join("b.xlsx"), b"x").unwrap();
        fs::write(dir.join("a.xlsx"), b"x").unwrap();
        fs::write(dir.join("notes.txt"), b"x").unwrap();
        fs::write(dir.join("old.xls"), b"x").unwrap();
        fs::create_dir(dir.join("folder.xlsx")).unwrap();

        let files = find_matching_files(&dir, "*.xlsx").unwrap();
        assert_eq!(files, vec![dir.join("a.xlsx"), dir.join("b.xlsx")]);

        let legacy = find_matching_files(&dir, "*.xls").unwrap();
        assert_eq!(legacy, vec![dir.join("old.xls")]);
    }

    #[test]
    fn test_find_matching_files_ignores_extension_case() {
        let (_temp_dir, dir) = temp_path();
        fs::write(dir.join("VENTAS.XLSX"), b"x").unwrap();
        fs::write(dir.join("datos.Xlsx"), b"x").unwrap();
        fs::write(dir.join("resumen.XLS"), b"x").unwrap();

        let files = find_matching_files(&dir, "*.xlsx").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.join("VENTAS.XLSX")));
        assert!(files.contains(&dir.join("datos.Xlsx")));
    }

    #[test]
    fn test_find_matching_files_in_bracketed_folder() {
        let (_temp_dir, dir) = temp_path();
        let folder = dir.join("reports [2024]");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("q1.xlsx"), b"x").unwrap();

        let files = find_matching_files(&folder, "*.xlsx").unwrap();
        assert_eq!(files, vec![folder.join("q1.xlsx")]);
    }

    #[test]
    fn test_invalid_pattern() {
        let (_temp_dir, dir) = temp_path();
        assert!(find_matching_files(&dir, "[*.xlsx").is_err());
    }

    #[test]
    fn test_load_file_list() {
        let (_temp_dir, dir) = temp_path();
        let list = dir.join("files.json");
        fs::write(&list, r#"["C:\\datos\\a.xlsx", "relative/b.xlsx"]"#).unwrap();

        let files = load_file_list(&list).unwrap();
        assert_eq!(
            files,
            vec![
                Utf8PathBuf::from("C:\\datos\\a.xlsx"),
                Utf8PathBuf::from("relative/b.xlsx")
            ]
        );
    }

    #[test]
    fn test_load_file_list_rejects_non_array() {
        let (_temp_dir, dir) = temp_path();
        let list = dir.join("files.json");
        fs::write(&list, r#"{"files": ["a.xlsx"]}"#).unwrap();

        assert!(load_file_list(&list).is_err());
        assert!(load_file_list(&dir.join("missing.json")).is_err());
    }
}
