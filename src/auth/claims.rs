use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: u64,    // issued at (unix timestamp)
    pub exp: u64,    // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}
