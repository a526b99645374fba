use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, AppResult};

lazy_static! {
    // Punctuation reserved by URLs and the UI, plus control characters.
    static ref INVALID_CHAR: Regex =
        Regex::new(r##"[!"#%-,./;->@\[-\^`{-~\p{Cc}]+"##).expect("valid regex");
}

/// Checks a team or roster name. `kind` only shapes the error message.
pub fn check_name(kind: &str, name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::BadRequest(format!("empty {kind} name")));
    }
    if let Some(m) = INVALID_CHAR.find(name) {
        return Err(AppError::BadRequest(format!(
            "{kind} name contains invalid character \"{}\"",
            m.as_str()
        )));
    }
    Ok(())
}

pub fn check_timezone(tz: &str, supported: &[String]) -> AppResult<()> {
    if supported.iter().any(|s| s == tz) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "scheduling_timezone {tz} is not supported. Supported timezones: {}",
            supported.join(", ")
        )))
    }
}
