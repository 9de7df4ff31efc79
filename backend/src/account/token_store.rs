use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::models::{Account, Credential, TokenRecord};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid token")]
    NotFound,
    #[error("Token expired")]
    Expired,
    #[error("Token already used")]
    AlreadyUsed,
    #[error("Account not found: {0}")]
    UnknownAccount(Uuid),
    #[error("Password must be at least {} characters long", MIN_PASSWORD_LEN)]
    WeakPassword,
    #[error("Account store unavailable: {0}")]
    Storage(String),
}

/// Password-reset tokens and the credentials they guard.
pub trait TokenStore: Send + Sync {
    fn lookup(&self, token: &str) -> Result<TokenRecord, AccountError>;

    /// Marks the token used and replaces the account's credential in one
    /// step. Refuses expired or already used tokens.
    fn consume(&self, token: &str, new_credential: &str) -> Result<(), AccountError>;

    fn issue(&self, account_id: Uuid, ttl: Duration) -> Result<TokenRecord, AccountError>;

    fn account_email(&self, account_id: Uuid) -> Result<String, AccountError>;
}

#[derive(Default)]
struct StoreState {
    accounts: HashMap<Uuid, Account>,
    tokens: HashMap<String, TokenRecord>,
}

/// Process-local store; everything lives behind one lock so `consume` is
/// atomic.
///
/// Stands in for the external account service, which registers accounts and
/// issues tokens. Nothing persists across restarts, and a fresh store knows no
/// tokens, so both reset endpoints answer "Invalid token" until something
/// calls `register` and `issue`.
#[derive(Default)]
pub struct InMemoryTokenStore {
    state: Mutex<StoreState>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, AccountError> {
        self.state
            .lock()
            .map_err(|_| AccountError::Storage("lock poisoned".to_string()))
    }

    pub fn register(&self, email: &str, password: &str) -> Result<Uuid, AccountError> {
        validate_password(password)?;
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_string(),
            credential: Credential::new(password),
            updated_at: Utc::now(),
        };
        let id = account.id;
        self.state()?.accounts.insert(id, account);
        log::info!("Registered account {}", id);
        Ok(id)
    }

    pub fn check_password(&self, account_id: Uuid, password: &str) -> Result<bool, AccountError> {
        let state = self.state()?;
        let account = state
            .accounts
            .get(&account_id)
            .ok_or(AccountError::UnknownAccount(account_id))?;
        Ok(account.credential.matches(password))
    }
}

impl TokenStore for InMemoryTokenStore {
    fn lookup(&self, token: &str) -> Result<TokenRecord, AccountError> {
        self.state()?
            .tokens
            .get(token)
            .cloned()
            .ok_or(AccountError::NotFound)
    }

    fn consume(&self, token: &str, new_credential: &str) -> Result<(), AccountError> {
        validate_password(new_credential)?;
        let now = Utc::now();
        let mut state = self.state()?;
        let StoreState { accounts, tokens } = &mut *state;

        let record = tokens.get_mut(token).ok_or(AccountError::NotFound)?;
        if record.used {
            return Err(AccountError::AlreadyUsed);
        }
        if record.is_expired(now) {
            return Err(AccountError::Expired);
        }
        let account = accounts
            .get_mut(&record.account_id)
            .ok_or(AccountError::UnknownAccount(record.account_id))?;

        account.credential = Credential::new(new_credential);
        account.updated_at = now;
        record.mark_used(now);
        log::info!("Password reset for account {}", account.id);
        Ok(())
    }

    fn issue(&self, account_id: Uuid, ttl: Duration) -> Result<TokenRecord, AccountError> {
        let mut state = self.state()?;
        if !state.accounts.contains_key(&account_id) {
            return Err(AccountError::UnknownAccount(account_id));
        }
        let record = TokenRecord::issue(account_id, ttl);
        state.tokens.insert(record.token.clone(), record.clone());
        Ok(record)
    }

    fn account_email(&self, account_id: Uuid) -> Result<String, AccountError> {
        self.state()?
            .accounts
            .get(&account_id)
            .map(|account| account.email.clone())
            .ok_or(AccountError::UnknownAccount(account_id))
    }
}

fn validate_password(password: &str) -> Result<(), AccountError> {
    if password.trim().chars().count() < MIN_PASSWORD_LEN {
        return Err(AccountError::WeakPassword);
    }
    Ok(())
}
