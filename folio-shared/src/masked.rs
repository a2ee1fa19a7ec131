use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps a secret (gateway server key, signing secret) so it never shows up
/// in `Debug`/`Display` output, e.g. when a config struct is logged.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
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
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_value() {
        let key = Masked("SB-Mid-server-abc".to_string());
        assert_eq!(format!("{:?}", key), "********");
        assert_eq!(key.to_string(), "********");
        assert_eq!(key.expose(), "SB-Mid-server-abc");
    }
}
