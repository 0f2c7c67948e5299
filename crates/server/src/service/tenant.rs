//! Tenant service.

use super::load_tenant;
use crate::auth::AuthenticatedUser;
use crate::error::ApiResult;
use crate::state::AppState;
use sdms_core::TenantRecord;
use sdms_journal::TenantRepo;
use serde::Deserialize;
use tracing::info;

/// Group whose members may register tenants on an entitlement domain.
pub fn datalake_admin_group(esd: &str) -> String {
    format!("users.datalake.admins@{esd}")
}

/// Body of a tenant registration.
#[derive(Clone, Debug, Deserialize)]
pub struct RegisterTenant {
    pub esd: String,
    pub gcpid: String,
    /// Tenant admin group; the datalake admin group of `esd` when absent.
    pub default_acls: Option<String>,
}

/// Register a tenant. The caller must be a datalake admin of its domain.
pub async fn register(
    state: &AppState,
    user: &AuthenticatedUser,
    name: &str,
    input: RegisterTenant,
) -> ApiResult<TenantRecord> {
    let admin_group = datalake_admin_group(&input.esd);
    let tenant = TenantRecord {
        name: name.to_string(),
        default_acls: input.default_acls.unwrap_or_else(|| admin_group.clone()),
        esd: input.esd,
        gcpid: input.gcpid,
    };
    tenant.validate()?;
    state
        .authorizer
        .is_write_authorized(user, &[admin_group], true)
        .await?;
    state.journal.insert_tenant(&tenant).await?;
    info!(tenant = name, esd = %tenant.esd, "tenant registered");
    Ok(tenant)
}

pub async fn get(state: &AppState, name: &str) -> ApiResult<TenantRecord> {
    load_tenant(state, name).await
}

pub async fn list(state: &AppState) -> ApiResult<Vec<TenantRecord>> {
    Ok(state.journal.list_tenants().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use sdms_core::config::AppConfig;

    #[tokio::test]
    async fn test_register_get_list() {
        let state = AppState::for_testing(AppConfig::for_testing());
        let user = AuthenticatedUser::anonymous();
        let input = RegisterTenant {
            esd: "opendes.contoso.com".to_string(),
            gcpid: "gcp-a".to_string(),
            default_acls: None,
        };

        let tenant = register(&state, &user, "tenant-a", input.clone()).await.unwrap();
        assert_eq!(tenant.default_acls, "users.datalake.admins@opendes.contoso.com");
        assert_eq!(get(&state, "tenant-a").await.unwrap(), tenant);
        assert_eq!(list(&state).await.unwrap().len(), 1);

        let err = register(&state, &user, "tenant-a", input.clone()).await.unwrap_err();
        assert_eq!(err.code(), "already_exists");

        let err = register(&state, &user, "Bad_Name", input).await.unwrap_err();
        assert!(matches!(err, ApiError::Core(_)));

        let err = get(&state, "missing").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
