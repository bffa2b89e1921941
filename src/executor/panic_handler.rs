use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, turning a panic into a [`PanicInfo`] instead of unwinding further.
pub fn catch_panic<F, R>(f: F) -> Result<R, PanicInfo>
where
    F: FnOnce() -> R,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(PanicInfo::from_payload)
}

/// What is left of a panic once it has been caught.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicInfo {
    pub message: String,
}

impl PanicInfo {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        Self { message }
    }
}

impl fmt::Display for PanicInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_str_panic() {
        let result = catch_panic(|| {
            panic!("test panic");
        });

        assert_eq!(result.unwrap_err().message, "test panic");
    }

    #[test]
    fn test_catch_formatted_panic() {
        let result: Result<(), _> = catch_panic(|| panic!("bad item {}", 3));
        assert_eq!(result.unwrap_err().message, "bad item 3");
    }

    #[test]
    fn test_catch_opaque_payload() {
        let result: Result<(), _> = catch_panic(|| std::panic::panic_any(17u8));
        assert_eq!(result.unwrap_err().message, "Unknown panic");
    }

    #[test]
    fn test_success_passes_through() {
        assert_eq!(catch_panic(|| 42).unwrap(), 42);
    }
}
