use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for customer data (phone numbers, emails) that only ever prints
/// its last three characters through `Debug` and `Display`.
///
/// Serialization passes the real value through; the wrapper exists to keep
/// `tracing` fields from leaking full numbers into logs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn masked(&self) -> String {
        let value = self.0.as_ref();
        let len = value.chars().count();
        if len <= 3 {
            return "***".to_string();
        }
        let visible: String = value.chars().skip(len - 3).collect();
        format!("***{}", visible)
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}
