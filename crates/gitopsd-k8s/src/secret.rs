//! Resolves a `CredentialsRef` against the cluster's Secret API.
//!
//! Implements `SecretStore` against the one backend this controller actually
//! needs: the referenced secret always lives in the same cluster the
//! controller is running against.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;

use gitopsd_core::credential::{credentials_from_secret_data, Credentials, CredentialsRef, SecretStore};
use gitopsd_core::error::{Error, Result};

pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn resolve(&self, credentials_ref: &CredentialsRef) -> Result<Option<Credentials>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &credentials_ref.namespace);
        let secret = match api.get_opt(&credentials_ref.name).await {
            Ok(secret) => secret,
            Err(err) => return Err(Error::Transient(err.to_string())),
        };
        let Some(secret) = secret else {
            return Ok(None);
        };
        let data = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect();
        Ok(credentials_from_secret_data(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn prefers_ssh_key_over_user_token_when_both_present() {
        let mut data = HashMap::new();
        data.insert("ssh-privatekey".to_string(), b"-----BEGIN KEY-----".to_vec());
        data.insert("username".to_string(), b"git".to_vec());
        data.insert("password".to_string(), b"token".to_vec());
        let credentials = credentials_from_secret_data(&data).unwrap();
        assert!(matches!(credentials, Credentials::SshKey { .. }));
    }

    #[test]
    fn falls_back_to_user_token_without_an_ssh_key() {
        let mut data = HashMap::new();
        data.insert("username".to_string(), b"git".to_vec());
        data.insert("password".to_string(), b"token".to_vec());
        let credentials = credentials_from_secret_data(&data).unwrap();
        assert!(matches!(credentials, Credentials::UserToken { .. }));
    }

    #[test]
    fn returns_none_for_unrecognized_secret_shape() {
        let data = HashMap::new();
        assert!(credentials_from_secret_data(&data).is_none());
    }
}
