//! Endpoints that are not part of the [`Backend`] contract: session
//! management, account and billing.
//!
//! [`Backend`]: omnidocs_protocol::Backend

use omnidocs_protocol::{
    CheckoutResponse, Organization, OrganizationStats, PortalSession,
    QueryHistoryEntry, QueryRequest, QueryResponse, Session,
    SessionListResponse, Subscription, UsageStats,
};
use reqwest::Method;

use crate::{Error, HttpBackend, proto, send_empty, send_json};

impl HttpBackend {
    /// Fetches a session together with its messages.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, Error> {
        send_json(self.request(Method::GET, &format!("/sessions/{session_id}")))
            .await
    }

    /// Lists sessions, most recent first.
    pub async fn list_sessions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<SessionListResponse, Error> {
        let req = self.request_with_query(
            Method::GET,
            "/sessions",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )?;
        send_json(req).await
    }

    /// Renames a session.
    pub async fn update_session(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<Session, Error> {
        let req = self.request_with_query(
            Method::PATCH,
            &format!("/sessions/{session_id}"),
            &[("title", title.to_owned())],
        )?;
        send_json(req).await
    }

    /// Deletes a session.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), Error> {
        send_empty(
            self.request(Method::DELETE, &format!("/sessions/{session_id}")),
        )
        .await
    }

    /// Asks a question and waits for the complete answer.
    pub async fn query(&self, req: &QueryRequest) -> Result<QueryResponse, Error> {
        send_json(self.request(Method::POST, "/query").json(req)).await
    }

    /// Lists previously asked questions, optionally within one session.
    pub async fn query_history(
        &self,
        limit: u32,
        offset: u32,
        session_id: Option<&str>,
    ) -> Result<Vec<QueryHistoryEntry>, Error> {
        let mut pairs =
            vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(session_id) = session_id {
            pairs.push(("session_id", session_id.to_owned()));
        }
        let req = self.request_with_query(Method::GET, "/query/history", &pairs)?;
        send_json(req).await
    }

    /// Fetches the organization of the authenticated user.
    pub async fn current_organization(&self) -> Result<Organization, Error> {
        send_json(self.request(Method::GET, "/organizations/current")).await
    }

    /// Fetches aggregated statistics of the current organization.
    pub async fn organization_stats(&self) -> Result<OrganizationStats, Error> {
        send_json(self.request(Method::GET, "/organizations/current/stats")).await
    }

    /// Fetches usage against the plan limits.
    pub async fn usage(&self) -> Result<UsageStats, Error> {
        send_json(self.request(Method::GET, "/organizations/current/usage")).await
    }

    /// Renames the current organization.
    pub async fn update_organization(
        &self,
        name: &str,
    ) -> Result<Organization, Error> {
        let req = self.request_with_query(
            Method::PATCH,
            "/organizations/current",
            &[("name", name.to_owned())],
        )?;
        send_json(req).await
    }

    /// Starts a hosted checkout to change the plan.
    pub async fn create_checkout(
        &self,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutResponse, Error> {
        let body = proto::CheckoutBody {
            price_id,
            success_url,
            cancel_url,
        };
        send_json(self.request(Method::POST, "/billing/checkout").json(&body))
            .await
    }

    /// Fetches the current subscription.
    pub async fn subscription(&self) -> Result<Subscription, Error> {
        send_json(self.request(Method::GET, "/billing/subscription")).await
    }

    /// Opens a hosted billing portal session.
    pub async fn create_portal_session(
        &self,
        return_url: &str,
    ) -> Result<PortalSession, Error> {
        let req = self.request_with_query(
            Method::POST,
            "/billing/portal",
            &[("return_url", return_url.to_owned())],
        )?;
        send_json(req).await
    }
}
