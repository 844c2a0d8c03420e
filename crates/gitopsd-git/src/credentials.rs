//! Bridges `gitopsd_core::credential::Credentials` to `git2::RemoteCallbacks`.

use git2::{Cred, RemoteCallbacks};
use gitopsd_core::credential::Credentials;

/// Builds remote callbacks that authenticate with the given materialized
/// credentials. Credentials live only in this closure's capture for the
/// duration of the call — nothing here is logged.
pub fn callbacks_for<'a>(credentials: Option<&'a Credentials>) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    if let Some(creds) = credentials {
        callbacks.credentials(move |_url, username_from_url, _allowed_types| match creds {
            Credentials::SshKey { private_key_pem, passphrase, username } => Cred::ssh_key_from_memory(
                username_from_url.unwrap_or(username),
                None,
                private_key_pem,
                passphrase.as_deref(),
            ),
            Credentials::UserToken { username, password } => Cred::userpass_plaintext(username, password),
        });
    }
    callbacks
}
