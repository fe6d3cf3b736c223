//! Login and logout commands.

use crate::session::SessionOptions;
use mealsync_engine::{CredentialProvider, StoredCredentials};

/// Stores a token pair in the local store.
pub fn login(
    options: &SessionOptions,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = StoredCredentials::new(options.open_store()?);
    credentials.set_tokens(access_token, refresh_token);
    println!("Tokens stored in {:?}", options.store);
    Ok(())
}

/// Forgets the stored token pair.
pub fn logout(options: &SessionOptions) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = StoredCredentials::new(options.open_store()?);
    credentials.clear_tokens();
    println!("Signed out");
    Ok(())
}
