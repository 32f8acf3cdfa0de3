//! Bearer token lifecycle: a stored seed token is exchanged for a fresh one
//! at startup and renewed every lease period for as long as the run lasts.

pub mod error;
pub mod manager;
pub mod store;

pub use self::error::CredentialError;
pub use self::manager::{CredentialManager, DEFAULT_LEASE, MAX_LEASE};
pub use self::store::{CredentialStore, FileCredentialStore};

/// Make sure the store holds a seed token before the first refresh.
///
/// A token passed on the command line replaces whatever is stored. Otherwise
/// the stored token is kept, and `token_provider` is asked only when the
/// store is empty.
pub async fn ensure_seed(
    store: &dyn CredentialStore,
    provided: Option<String>,
    token_provider: &dyn Fn() -> Option<String>,
) -> Result<(), CredentialError> {
    let provided = provided
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(token) = provided {
        store.save(&token).await?;
        tracing::debug!("Stored token from command line");
        return Ok(());
    }
    if store.load().await?.is_some() {
        return Ok(());
    }
    let token = token_provider()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(CredentialError::NoSeed)?;
    store.save(&token).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::store::tests::MemoryCredentialStore;
    use super::*;

    #[tokio::test]
    async fn test_provided_token_replaces_stored() {
        let store = MemoryCredentialStore::seeded("old");
        ensure_seed(&store, Some(" new \n".into()), &|| -> Option<String> { panic!("no prompt") })
            .await
            .unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_stored_token_skips_prompt() {
        let store = MemoryCredentialStore::seeded("stored");
        ensure_seed(&store, None, &|| -> Option<String> { panic!("no prompt") }).await.unwrap();
        assert!(store.saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_used_when_store_empty() {
        let store = MemoryCredentialStore::default();
        ensure_seed(&store, None, &|| Some("typed".into())).await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("typed"));
    }

    #[tokio::test]
    async fn test_blank_prompt_is_no_seed() {
        let store = MemoryCredentialStore::default();
        let err = ensure_seed(&store, None, &|| Some("  ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NoSeed));
    }
}
