//! Group membership and the authorization oracle.
//!
//! Membership is read through [`Entitlements`], which serves members one
//! page at a time. [`members`] turns the pages into a lazy stream that can be
//! restarted from any page cursor, and [`is_member_of_group`] scans it
//! iteratively.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use sdms_core::config::AuthConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// One page of group members.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberPage {
    pub members: Vec<String>,
    /// Cursor of the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Source of group membership.
#[async_trait]
pub trait Entitlements: Send + Sync {
    /// List one page of `group`, starting at `cursor` (first page when `None`).
    /// Unknown groups have no members.
    async fn list_members(&self, group: &str, cursor: Option<&str>) -> ApiResult<MemberPage>;
}

/// Lazily page through the members of `group`, starting at `cursor`.
pub fn members<'a>(
    entitlements: &'a dyn Entitlements,
    group: &'a str,
    cursor: Option<String>,
) -> impl Stream<Item = ApiResult<String>> + Send + 'a {
    // `None` state means the last page has been served.
    stream::try_unfold(Some(cursor), move |state| async move {
        let Some(cursor) = state else {
            return Ok::<_, ApiError>(None);
        };
        let page = entitlements.list_members(group, cursor.as_deref()).await?;
        let next = page
            .next_cursor
            .filter(|c| !c.is_empty())
            .map(Some);
        let members = stream::iter(page.members.into_iter().map(Ok::<_, ApiError>));
        Ok::<_, ApiError>(Some((members, next)))
    })
    .try_flatten()
}

/// Whether `email` is a member of `group`.
pub async fn is_member_of_group(
    entitlements: &dyn Entitlements,
    email: &str,
    group: &str,
) -> ApiResult<bool> {
    let mut members = std::pin::pin!(members(entitlements, group, None));
    while let Some(member) = members.try_next().await? {
        if member.eq_ignore_ascii_case(email) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Entitlements from the `auth.groups` configuration section.
pub struct ConfigEntitlements {
    groups: HashMap<String, Vec<String>>,
    page_size: usize,
}

impl ConfigEntitlements {
    pub fn new(groups: HashMap<String, Vec<String>>, page_size: usize) -> Self {
        Self {
            groups,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let groups = config
            .groups
            .iter()
            .map(|g| (g.email.to_lowercase(), g.members.clone()))
            .collect();
        Self::new(groups, config.member_page_size)
    }
}

#[async_trait]
impl Entitlements for ConfigEntitlements {
    async fn list_members(&self, group: &str, cursor: Option<&str>) -> ApiResult<MemberPage> {
        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| ApiError::BadRequest(format!("invalid member cursor: {c}")))?,
            None => 0,
        };
        let Some(all) = self.groups.get(&group.to_lowercase()) else {
            return Ok(MemberPage::default());
        };
        let end = offset.saturating_add(self.page_size).min(all.len());
        let members = all.get(offset..end).map(<[String]>::to_vec).unwrap_or_default();
        let next_cursor = (end < all.len()).then(|| end.to_string());
        Ok(MemberPage {
            members,
            next_cursor,
        })
    }
}

/// Answers read and write authorization questions for a user and a set of groups.
#[derive(Clone)]
pub struct Authorizer {
    enabled: bool,
    entitlements: Arc<dyn Entitlements>,
}

impl Authorizer {
    pub fn new(enabled: bool, entitlements: Arc<dyn Entitlements>) -> Self {
        Self {
            enabled,
            entitlements,
        }
    }

    /// Whether `user` may read a resource governed by `groups`.
    /// With `raise`, a refusal is returned as a permission error.
    pub async fn is_read_authorized(
        &self,
        user: &AuthenticatedUser,
        groups: &[String],
        raise: bool,
    ) -> ApiResult<bool> {
        self.check(user, groups, raise, "read").await
    }

    /// Whether `user` may modify a resource governed by `groups`.
    pub async fn is_write_authorized(
        &self,
        user: &AuthenticatedUser,
        groups: &[String],
        raise: bool,
    ) -> ApiResult<bool> {
        self.check(user, groups, raise, "write").await
    }

    async fn check(
        &self,
        user: &AuthenticatedUser,
        groups: &[String],
        raise: bool,
        access: &'static str,
    ) -> ApiResult<bool> {
        if !self.enabled {
            return Ok(true);
        }
        for group in groups {
            if is_member_of_group(self.entitlements.as_ref(), &user.email, group).await? {
                return Ok(true);
            }
        }
        metrics::AUTHORIZATION_DENIALS
            .with_label_values(&[access])
            .inc();
        tracing::info!(user = %user.email, access, "authorization refused");
        if raise {
            Err(ApiError::Forbidden(format!(
                "user {} does not have {access} access to this resource",
                user.email
            )))
        } else {
            Ok(false)
        }
    }
}
