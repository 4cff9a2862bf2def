pub mod password;
mod principal;
mod token;

pub use principal::{bearer_token, Operation, Principal};
pub use token::{AccessClaims, RefreshClaims, TokenError, TokenIssuer};
