//! Kind-agnostic resource access via `kube::discovery` and `DynamicObject`.

use kube::api::{Api, DynamicObject};
use kube::core::GroupVersionKind;
use kube::discovery;
use kube::Client;

use crate::error::{K8sError, K8sResult};
use gitopsd_core::resource::ResourceIdentity;

/// Resolves `identity`'s `(group, version, kind)` against the cluster's API
/// discovery and returns an `Api<DynamicObject>` scoped to its namespace.
pub async fn api_for(client: &Client, identity: &ResourceIdentity) -> K8sResult<Api<DynamicObject>> {
    let gvk = GroupVersionKind::gvk(&identity.group, &identity.version, &identity.kind);
    let (api_resource, _caps) = discovery::pinned_kind(client, &gvk).await.map_err(|source| K8sError::Discovery {
        group: identity.group.clone(),
        version: identity.version.clone(),
        kind: identity.kind.clone(),
        source,
    })?;
    Ok(Api::namespaced_with(client.clone(), &identity.namespace, &api_resource))
}
