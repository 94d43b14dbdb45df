// Authentication and authorization

pub mod audit_logger;
pub mod credentials;
pub mod extract;
pub mod gate;
pub mod password;
pub mod token_hash;
pub mod tokens;

pub use credentials::{AuthTokens, CredentialService, Registration};
pub use extract::CurrentUser;
pub use gate::{authorize, Requirement};
pub use tokens::TokenIssuer;
