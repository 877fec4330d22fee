use crate::error::{Result, SourceError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::traits::DestinationClient;
use crate::trakt::api::{
    self, api_headers, CreateListBody, MutationBody, MutationSummary, TraktList, WireItem, API_URL,
    HISTORY_LIMIT,
};
use crate::trakt::auth::{self, AuthSession, TraktCredentials};
use crate::trakt::executor::RequestExecutor;
use async_trait::async_trait;
use media_sync_models::{Item, ItemKind, List};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Authenticated Trakt client. The session is established once in
/// [`TraktClient::connect`] and never changes afterwards.
#[derive(Clone)]
pub struct TraktClient {
    executor: RequestExecutor,
    client_id: String,
    session: Arc<AuthSession>,
}

impl TraktClient {
    /// Production client: reqwest transport, tokio timer
    pub async fn new(credentials: &TraktCredentials, timeout: Duration) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(timeout)?);
        Self::connect(credentials, transport, RetryPolicy::default(), Arc::new(TokioSleeper)).await
    }

    pub async fn connect(
        credentials: &TraktCredentials,
        transport: Arc<dyn HttpTransport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let executor = RequestExecutor::new(transport, policy, sleeper);
        let session = auth::authenticate(&executor, credentials).await?;
        Ok(Self::with_session(executor, credentials.client_id.clone(), session))
    }

    pub fn with_session(executor: RequestExecutor, client_id: String, session: AuthSession) -> Self {
        Self {
            executor,
            client_id,
            session: Arc::new(session),
        }
    }

    pub fn username(&self) -> &str {
        &self.session.username
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, format!("{}{}", API_URL, path))
            .headers(api_headers(&self.client_id, Some(&self.session.access_token)))
    }

    fn user_path(&self, suffix: &str) -> String {
        format!("/users/{}{}", urlencoding::encode(&self.session.username), suffix)
    }

    /// GET returning `None` on 404
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.executor.execute(self.request(HttpMethod::Get, path)).await?;
        if response.status == 404 {
            return Ok(None);
        }
        Ok(Some(response.json()?))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_optional(path).await?.ok_or_else(|| SourceError::Api {
            method: HttpMethod::Get.to_string(),
            url: format!("{}{}", API_URL, path),
            status: 404,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpResponse> {
        let request = self.request(HttpMethod::Post, path).json(serde_json::to_value(body)?);
        let url = request.url.clone();
        let response = self.executor.execute(request).await?;
        if response.status == 404 {
            return Err(SourceError::Api {
                method: HttpMethod::Post.to_string(),
                url,
                status: 404,
            });
        }
        Ok(response)
    }

    async fn mutate(&self, operation: &str, path: &str, body: MutationBody) -> Result<MutationSummary> {
        if body.is_empty() {
            return Ok(MutationSummary::default());
        }
        debug!(operation, count = body.len(), "Sending Trakt mutation");
        let summary: MutationSummary = self.post(path, &body).await?.json()?;
        summary.log_not_found(operation);
        Ok(summary)
    }

    async fn mutate_list(&self, operation: &str, slug: &str, suffix: &str, body: MutationBody) -> Result<MutationSummary> {
        if body.is_empty() {
            return Ok(MutationSummary::default());
        }
        let path = self.user_path(&format!("/lists/{}/items{}", slug, suffix));
        let request = self.request(HttpMethod::Post, &path).json(serde_json::to_value(&body)?);
        let response = self.executor.execute(request).await?;
        if response.status == 404 {
            return Err(SourceError::ListNotFound(slug.to_string()));
        }
        let summary: MutationSummary = response.json()?;
        summary.log_not_found(operation);
        Ok(summary)
    }
}

#[async_trait]
impl DestinationClient for TraktClient {
    fn destination_name(&self) -> &str {
        "trakt"
    }

    async fn get_watchlist(&self) -> Result<List> {
        let wire: Vec<WireItem> = self.get("/sync/watchlist").await?;
        let items = api::into_items(wire);
        debug!(count = items.len(), "Fetched Trakt watchlist");
        Ok(List::watchlist("watchlist", items))
    }

    async fn add_watchlist_items(&self, items: &[Item]) -> Result<MutationSummary> {
        self.mutate("add watchlist items", "/sync/watchlist", MutationBody::identities(items))
            .await
    }

    async fn remove_watchlist_items(&self, items: &[Item]) -> Result<MutationSummary> {
        self.mutate("remove watchlist items", "/sync/watchlist/remove", MutationBody::identities(items))
            .await
    }

    async fn get_lists(&self) -> Result<Vec<List>> {
        let lists: Vec<TraktList> = self.get(&self.user_path("/lists")).await?;
        Ok(lists.into_iter().map(|meta| meta.into_list(Vec::new())).collect())
    }

    async fn get_list(&self, slug: &str) -> Result<List> {
        let meta: Option<TraktList> = self.get_optional(&self.user_path(&format!("/lists/{}", slug))).await?;
        let meta = meta.ok_or_else(|| SourceError::ListNotFound(slug.to_string()))?;
        let wire: Option<Vec<WireItem>> = self
            .get_optional(&self.user_path(&format!("/lists/{}/items", slug)))
            .await?;
        let wire = wire.ok_or_else(|| SourceError::ListNotFound(slug.to_string()))?;
        let items = api::into_items(wire);
        debug!(list = %slug, count = items.len(), "Fetched Trakt list");
        Ok(meta.into_list(items))
    }

    async fn create_list(&self, name: &str, source_id: &str) -> Result<List> {
        let body = CreateListBody::for_source_list(name, source_id);
        let meta: TraktList = self.post(&self.user_path("/lists"), &body).await?.json()?;
        info!(list = %meta.ids.slug, name = %name, "Created Trakt list");
        Ok(meta.into_list(Vec::new()))
    }

    async fn delete_list(&self, slug: &str) -> Result<()> {
        let path = self.user_path(&format!("/lists/{}", slug));
        let response = self.executor.execute(self.request(HttpMethod::Delete, &path)).await?;
        if response.status == 404 {
            return Err(SourceError::ListNotFound(slug.to_string()));
        }
        info!(list = %slug, "Deleted Trakt list");
        Ok(())
    }

    async fn add_list_items(&self, slug: &str, items: &[Item]) -> Result<MutationSummary> {
        self.mutate_list("add list items", slug, "", MutationBody::identities(items))
            .await
    }

    async fn remove_list_items(&self, slug: &str, items: &[Item]) -> Result<MutationSummary> {
        self.mutate_list("remove list items", slug, "/remove", MutationBody::identities(items))
            .await
    }

    async fn get_ratings(&self) -> Result<Vec<Item>> {
        let wire: Vec<WireItem> = self.get("/sync/ratings").await?;
        let items = api::into_items(wire);
        debug!(count = items.len(), "Fetched Trakt ratings");
        Ok(items)
    }

    async fn add_ratings(&self, items: &[Item]) -> Result<MutationSummary> {
        self.mutate("add ratings", "/sync/ratings", MutationBody::from_items(items))
            .await
    }

    async fn remove_ratings(&self, items: &[Item]) -> Result<MutationSummary> {
        self.mutate("remove ratings", "/sync/ratings/remove", MutationBody::identities(items))
            .await
    }

    async fn get_history(&self, kind: ItemKind, id: &str) -> Result<Vec<Item>> {
        let path = format!(
            "/sync/history/{}/{}?limit={}",
            kind.plural(),
            urlencoding::encode(id),
            HISTORY_LIMIT
        );
        let wire: Option<Vec<WireItem>> = self.get_optional(&path).await?;
        Ok(wire.map(api::into_items).unwrap_or_default())
    }

    async fn add_history(&self, items: &[Item]) -> Result<MutationSummary> {
        self.mutate("add history", "/sync/history", MutationBody::from_items(items))
            .await
    }

    async fn remove_history(&self, items: &[Item]) -> Result<MutationSummary> {
        self.mutate("remove history", "/sync/history/remove", MutationBody::identities(items))
            .await
    }
}
