pub mod depositdata;
pub mod reedline;

use eyre::{Result, WrapErr, eyre};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Expand "~/..." and environment variables in a user supplied path
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path = path
        .to_str()
        .ok_or_else(|| eyre!("non UTF-8 path: {:?}", path))?;
    Ok(shellexpand::full(path)?.to_string().into())
}

/// Deposit JSON from `--json`, a file (`-` for stdin) or, when neither
/// was given, an interactive prompt
pub fn read_deposit_input(file: &Option<PathBuf>, json: &Option<String>) -> Result<String> {
    match (file, json) {
        (_, Some(json)) => Ok(json.clone()),
        (Some(path), None) if path.as_os_str() == "-" => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
        (Some(path), None) => {
            let path = expand_path(path)?;
            std::fs::read_to_string(&path).wrap_err_with(|| format!("{:?}", path))
        }
        (None, None) => reedline::read_until_blank(
            "Please paste the deposit JSON, end with an empty line.\n",
        ),
    }
}
