use std::collections::HashMap;

use ldap3::{ldap_escape, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};

use crate::config::LdapDomainConfig;
use crate::error::{AppError, AppResult};
use crate::models::DirectoryProfile;

/// Result code for a failed bind with a bad DN or password.
const INVALID_CREDENTIALS: u32 = 49;

/// What a directory bind decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    /// Credentials accepted. Carries whatever profile the search returned.
    Accepted(DirectoryProfile),
    Rejected,
}

/// Checks `username`/`password` against one directory domain.
pub async fn bind_user(
    config: &LdapDomainConfig,
    username: &str,
    password: &str,
) -> AppResult<DirectoryOutcome> {
    if password.is_empty() {
        return Ok(DirectoryOutcome::Rejected);
    }

    match try_bind(config, username, password).await {
        Ok(outcome) => Ok(outcome),
        Err(LdapError::LdapResult { result }) if result.rc == INVALID_CREDENTIALS => {
            Ok(DirectoryOutcome::Rejected)
        }
        Err(e) => {
            tracing::warn!(url = %config.url, error = %e, "directory unavailable");
            Err(AppError::Unavailable(format!("directory unavailable: {e}")))
        }
    }
}

async fn try_bind(
    config: &LdapDomainConfig,
    username: &str,
    password: &str,
) -> Result<DirectoryOutcome, LdapError> {
    let settings = connection_settings(config).await?;
    let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &config.url).await?;
    ldap3::drive!(conn);

    let mut auth_user = format!("{username}{}", config.user_suffix);
    let mut profile = DirectoryProfile::default();

    if let Some(bind_user) = config.bind_user.as_deref().filter(|u| !u.is_empty()) {
        ldap.simple_bind(bind_user, config.bind_password.as_deref().unwrap_or_default())
            .await?
            .success()?;

        let filter = search_filter(&config.search_filter, username);
        let attrs: Vec<&str> = config.attrs.values().map(String::as_str).collect();
        let (entries, _) = ldap
            .search(&config.base_dn, Scope::Subtree, &filter, attrs)
            .await?
            .success()?;

        let Some(entry) = entries.into_iter().next() else {
            let _ = ldap.unbind().await;
            return Ok(DirectoryOutcome::Rejected);
        };
        let entry = SearchEntry::construct(entry);
        profile = map_attributes(&config.attrs, &entry.attrs);
        auth_user = entry.dn;
    }

    ldap.simple_bind(&auth_user, password).await?.success()?;
    let _ = ldap.unbind().await;
    Ok(DirectoryOutcome::Accepted(profile))
}

async fn connection_settings(config: &LdapDomainConfig) -> Result<LdapConnSettings, LdapError> {
    let settings = LdapConnSettings::new();
    let Some(path) = config.cert_path.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(settings);
    };

    tracing::info!(cert_path = %path, "using directory CA certificate");
    let pem = tokio::fs::read(path).await?;
    let cert = native_tls::Certificate::from_pem(&pem)?;
    let connector = native_tls::TlsConnector::builder()
        .add_root_certificate(cert)
        .build()?;
    Ok(settings.set_connector(connector))
}

/// Substitutes the escaped username for the `%s` placeholder.
pub fn search_filter(template: &str, username: &str) -> String {
    template.replace("%s", &ldap_escape(username))
}

/// Turns directory attributes into a profile. `attrs` maps a local field
/// (`full_name` or a contact mode) to the directory attribute holding it;
/// the first value of a multi-valued attribute wins.
pub fn map_attributes(
    attrs: &HashMap<String, String>,
    entry: &HashMap<String, Vec<String>>,
) -> DirectoryProfile {
    let mut profile = DirectoryProfile::default();
    for (field, attr) in attrs {
        let Some(value) = entry.get(attr).and_then(|v| v.first()) else {
            continue;
        };
        if field == "full_name" {
            profile.full_name = Some(value.clone());
        } else {
            profile.contacts.insert(field.clone(), value.clone());
        }
    }
    profile
}
