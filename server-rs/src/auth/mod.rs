//! Credential checking for `/login`.

pub mod ldap;

use crate::config::{AuthBackend, AuthConfig, LdapDomainConfig};
use crate::error::{AppError, AppResult};
use crate::store::OncallStore;
use ldap::DirectoryOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    Rejected,
}

pub struct Authenticator {
    config: AuthConfig,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        if config.backend == AuthBackend::Debug {
            tracing::warn!("debug authentication enabled, every login will succeed");
        }
        Self { config }
    }

    pub async fn authenticate(
        &self,
        store: &dyn OncallStore,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> AppResult<AuthOutcome> {
        match self.config.backend {
            AuthBackend::Debug => Ok(AuthOutcome::Authenticated),
            AuthBackend::Local => local_auth(store, username, password).await,
            AuthBackend::Ldap => {
                let domain = self.domain(domain)?;
                match ldap::bind_user(domain, username, password).await? {
                    DirectoryOutcome::Rejected => Ok(AuthOutcome::Rejected),
                    DirectoryOutcome::Accepted(profile) => {
                        if domain.import_user {
                            let created = store.upsert_directory_user(username, &profile).await?;
                            tracing::info!(user = %username, created, "user imported from directory");
                        }
                        Ok(AuthOutcome::Authenticated)
                    }
                }
            }
        }
    }

    /// Picks the directory for a login: the named domain, else the configured
    /// default, else the only one configured.
    fn domain(&self, requested: Option<&str>) -> AppResult<&LdapDomainConfig> {
        let domains = &self.config.ldap_domains;
        let name = match requested.or(self.config.default_domain.as_deref()) {
            Some(name) => name,
            None if domains.len() == 1 => return domains.values().next().ok_or_else(no_domain),
            None => return Err(no_domain()),
        };
        domains
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("LDAP Domain \"{name}\" not found")))
    }
}

fn no_domain() -> AppError {
    AppError::NotFound("Chosen domain not found".into())
}

async fn local_auth(store: &dyn OncallStore, username: &str, password: &str) -> AppResult<AuthOutcome> {
    if password.is_empty() {
        return Ok(AuthOutcome::Rejected);
    }
    let Some(hash) = store.password_hash(username).await? else {
        return Ok(AuthOutcome::Rejected);
    };
    match bcrypt::verify(password, &hash) {
        Ok(true) => Ok(AuthOutcome::Authenticated),
        Ok(false) => Ok(AuthOutcome::Rejected),
        Err(e) => {
            tracing::warn!(user = %username, "unusable password hash: {e}");
            Ok(AuthOutcome::Rejected)
        }
    }
}
