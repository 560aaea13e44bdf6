pub mod mem_size {
    use std::num::ParseFloatError;

    use derive_more::derive::{Display, Into};
    use log::warn;
    use thiserror::Error;

    const K: f64 = 1024f64;

    /// Memory quantity as reported by `sinfo`, normalized to MB (2^20 bytes, what slurm calls MB).
    #[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Display, Into)]
    pub struct MemSize(f64);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Unit {
        Bytes,
        Kilo,
        Mega,
        Giga,
        Tera,
    }

    impl Unit {
        /// Case-insensitive. `None` for anything outside B/KB/MB/GB/TB.
        pub fn from_suffix(suffix: &str) -> Option<Self> {
            match suffix.to_ascii_uppercase().as_str() {
                "B" => Some(Unit::Bytes),
                "KB" => Some(Unit::Kilo),
                "MB" => Some(Unit::Mega),
                "GB" => Some(Unit::Giga),
                "TB" => Some(Unit::Tera),
                _ => None,
            }
        }

        /// Multiplier to get from this unit to MB.
        pub fn factor(self) -> f64 {
            match self {
                Unit::Bytes => 1f64 / (K * K),
                Unit::Kilo => 1f64 / K,
                Unit::Mega => 1f64,
                Unit::Giga => K,
                Unit::Tera => K * K,
            }
        }
    }

    impl MemSize {
        pub fn as_mib(&self) -> f64 {
            self.0
        }

        pub fn as_gib(&self) -> f64 {
            self.0 / K
        }

        pub fn as_tib(&self) -> f64 {
            self.0 / K.powi(2)
        }

        /// Parses `<digits><letters>`, e.g. `1024000MB` or `12gb`. Only the leading digit run and
        /// the letters directly after it are looked at, the rest of the input is ignored.
        ///
        /// No suffix means the value is already in MB. Unknown suffixes (`PB`, `M`, ...) are
        /// treated the same way, with a warning.
        pub fn parse(input: &str) -> Result<MemSize, MemSizeParseError> {
            use MemSizeParseError::*;
            let input = input.trim();
            if input.is_empty() {
                return Err(Empty);
            }

            let digits_end = input
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(input.len());
            let (digits, rest) = input.split_at(digits_end);
            if digits.is_empty() {
                return Err(NoLeadingDigits(input.to_owned()));
            }
            let suffix_end = rest
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(rest.len());
            let suffix = &rest[..suffix_end];

            let factor = match Unit::from_suffix(suffix) {
                Some(unit) => unit.factor(),
                None if suffix.is_empty() => Unit::Mega.factor(),
                None => {
                    warn!("unknown memory unit `{suffix}` in `{input}`, assuming MB");
                    Unit::Mega.factor()
                }
            };

            Ok(MemSize(digits.parse::<f64>()? * factor))
        }
    }

    /// Lenient form of [`MemSize::parse`]: anything malformed is `0.0`.
    pub fn normalize(input: &str) -> f64 {
        MemSize::parse(input).map(|size| size.as_mib()).unwrap_or(0.0)
    }

    /// empty means empty after trimming
    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum MemSizeParseError {
        #[error("trying to parse an empty string")]
        Empty,
        #[error("`{0}` does not start with a number")]
        NoLeadingDigits(String),
        #[error("scalar part is not a number")]
        InvalidNumber(#[from] ParseFloatError),
    }

}

pub use mem_size::{normalize, MemSize, MemSizeParseError};
