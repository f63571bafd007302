//! Short code generation.

use crate::{CodeGenerator, CoreError, ShortCode};

/// URL-safe alphabet: letters, digits, `-` and `_` (64 symbols).
pub const ALPHABET: [char; 64] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j',
    'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1',
    '2', '3', '4', '5', '6', '7', '8', '9', '-', '_',
];

pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Upper bound on configurable code length.
pub const MAX_CODE_LENGTH: usize = 64;

/// Codes that collide with fixed HTTP routes and are never handed out.
pub const RESERVED_CODES: [&str; 2] = ["shorten", "urls"];

/// Whether `code` shadows a fixed route.
pub fn is_reserved(code: &ShortCode) -> bool {
    RESERVED_CODES.contains(&code.as_str())
}

/// Whether `b` belongs to [`ALPHABET`].
pub fn is_code_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Random fixed-length generator backed by nanoid's OS-seeded RNG.
#[derive(Clone, Copy, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Result<Self, CoreError> {
        if length == 0 || length > MAX_CODE_LENGTH {
            return Err(CoreError::InvalidInput(format!(
                "code length must be between 1 and {MAX_CODE_LENGTH}"
            )));
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
        }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> ShortCode {
        let length = self.length;
        let raw = nanoid::nanoid!(length, &ALPHABET);
        debug_assert!(
            !raw.is_empty() && raw.bytes().all(is_code_byte),
            "generated code outside the alphabet: {raw:?}"
        );
        ShortCode(raw)
    }
}
