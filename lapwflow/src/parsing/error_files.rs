//! Detection of non-empty solver error files.

use serde::Serialize;
use tracing::error;

use crate::errors::FileSetError;
use crate::files::FileSet;

/// Suffix of error files written by single-precision runs and auxiliary
/// programs (`lapw0.error`, `sgroup.error`, ...).
pub const DEFAULT_ERROR_SUFFIX: &str = "error";

/// Result of scanning a file set for error files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorScan {
    /// True if at least one matching file had content.
    pub has_error: bool,
    /// `File: <name>\n<content>\n` for every non-empty file, concatenated.
    pub message: String,
    /// Names of the non-empty error files.
    pub files: Vec<String>,
}

/// Scans every file whose name ends with `suffix`.
///
/// Any content at all, a lone newline included, flags the file.
pub fn scan<F>(files: &F, suffix: &str) -> Result<ErrorScan, FileSetError>
where
    F: FileSet + ?Sized,
{
    let mut result = ErrorScan::default();
    for name in files.names_with_suffix(suffix) {
        let content = files.read(&name)?;
        if content.is_empty() {
            continue;
        }
        result.has_error = true;
        result.message.push_str(&format!("File: {name}\n{content}\n"));
        result.files.push(name);
    }
    if result.has_error {
        error!(suffix, files = ?result.files, "Non-empty error files found:\n{}", result.message);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::MemoryFileSet;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_error_files_are_clean() {
        let files = MemoryFileSet::new()
            .with_file("lapw0.error", "")
            .with_file("lapw2.error", "")
            .with_file("case.scf", ":ENE");
        let scan = scan(&files, DEFAULT_ERROR_SUFFIX).unwrap();
        assert!(!scan.has_error);
        assert!(scan.message.is_empty());
    }

    #[test]
    fn test_whitespace_error_file_is_reported() {
        let files = MemoryFileSet::new()
            .with_file("lapw0.error", "")
            .with_file("lapw1.error", "\n");
        let scan = scan(&files, DEFAULT_ERROR_SUFFIX).unwrap();
        assert!(scan.has_error);
        assert_eq!(scan.files, vec!["lapw1.error"]);
        assert_eq!(scan.message, "File: lapw1.error\n\n\n");
    }

    #[test]
    fn test_non_empty_error_files_are_reported() {
        let files = MemoryFileSet::new()
            .with_file("lapw1.error", "'LAPW1' - Error in Parallel LAPW1")
            .with_file("lapw2.error", "")
            .with_file("mixer.error", "'MIXER' - charge leak");
        let scan = scan(&files, DEFAULT_ERROR_SUFFIX).unwrap();
        assert!(scan.has_error);
        assert_eq!(scan.files, vec!["lapw1.error", "mixer.error"]);
        assert_eq!(
            scan.message,
            "File: lapw1.error\n'LAPW1' - Error in Parallel LAPW1\n\
             File: mixer.error\n'MIXER' - charge leak\n"
        );
    }

    #[test]
    fn test_precision_suffixes_are_distinct() {
        let files = MemoryFileSet::new()
            .with_file("lapw1.error_prec3k", "")
            .with_file("lapw1.error_prec3", "boom");
        assert!(!scan(&files, ".error_prec3k").unwrap().has_error);
        assert!(scan(&files, ".error_prec3").unwrap().has_error);
        // The plain suffix does not pick up precision-qualified files.
        assert!(!scan(&files, DEFAULT_ERROR_SUFFIX).unwrap().has_error);
    }
}
