// Owner token generation
// A token is the capability proving who acquired a lock, so it must be unpredictable

use uuid::Uuid;

/// Source of owner tokens, one per acquire call
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random (v4) UUID tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenGenerator;

impl TokenGenerator for UuidTokenGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
