//! Online/offline routing of every meal operation.
//!
//! Each operation is attempted against the server when the device looks
//! online. A transport failure during that attempt degrades to the same
//! offline handling used when the device is known to be offline: the cache
//! is updated optimistically and the call is queued for the reconciler.
//!
//! Only authentication expiry, server-side rejections and unexpected
//! server failures are returned as errors.

use crate::cache::MealCache;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::credentials::CredentialProvider;
use crate::error::{SyncError, SyncResult};
use crate::queue::MutationQueue;
use crate::transport::{ApiRequest, ApiResponse, MultipartForm, RemoteTransport, RequestBody};
use chrono::Utc;
use mealsync_protocol::{
    generate_local_id, ApiEnvelope, HttpMethod, Meal, MealDraft, MealPage, MealPatch,
    MutationDescriptor, MutationKind, QueuedMutation, RefreshRequest, RemoteMeal, TokenPair,
};
use mealsync_storage::KeyValueStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collection endpoint for meals.
pub const MEALS_ENDPOINT: &str = "/meals";

/// Token rotation endpoint.
pub const REFRESH_ENDPOINT: &str = "/auth/refresh";

/// Message returned for a create handled offline.
pub const OFFLINE_CREATE_MESSAGE: &str = "Meal saved offline. It will sync when you're back online.";

/// Message returned for an update handled offline.
pub const OFFLINE_UPDATE_MESSAGE: &str = "Meal updated offline. Changes will sync when you're back online.";

/// Message returned for a delete handled offline.
pub const OFFLINE_DELETE_MESSAGE: &str = "Meal deleted offline. It will sync when you're back online.";

/// Message returned for a listing served from the cache.
pub const OFFLINE_LIST_MESSAGE: &str = "Showing offline data";

/// Multipart field carrying the photo.
const IMAGE_FIELD: &str = "image";

/// Entry point for all meal operations.
pub struct RequestGateway<T: RemoteTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    cache: MealCache,
    queue: MutationQueue,
    credentials: Arc<dyn CredentialProvider>,
    connectivity: ConnectivityMonitor,
    /// Serializes edits of pending meals with the settling of their creates.
    pending: Mutex<()>,
}

impl<T: RemoteTransport> RequestGateway<T> {
    /// Creates a gateway. The cache and the queue share `store`.
    pub fn new(
        config: SyncConfig,
        transport: Arc<T>,
        store: Arc<dyn KeyValueStore>,
        credentials: Arc<dyn CredentialProvider>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let cache = MealCache::new(store.clone(), config.cache_ttl);
        let queue = MutationQueue::new(store, config.max_retries);
        Self {
            config,
            transport,
            cache,
            queue,
            credentials,
            connectivity,
            pending: Mutex::new(()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the meal cache.
    pub fn cache(&self) -> &MealCache {
        &self.cache
    }

    /// Returns the mutation queue.
    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    /// Returns the connectivity monitor.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Creates a meal.
    ///
    /// Offline, or when the server cannot be reached, the meal is stored as
    /// a pending placeholder and the create is queued; the call still
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AuthenticationExpired`],
    /// [`SyncError::ValidationFailed`] or [`SyncError::Unknown`].
    pub async fn create_meal(&self, draft: MealDraft) -> SyncResult<ApiEnvelope<Meal>> {
        if !self.connectivity.is_online() {
            return Ok(self.create_offline(&draft));
        }

        let mut payload = serde_json::to_value(&draft)?;
        if let Value::Object(map) = &mut payload {
            map.remove("imagePath");
        }
        let request = create_request(MEALS_ENDPOINT, payload, draft.image_path.as_deref());

        match self.send_authorized(request).await {
            Ok(response) => {
                let meal = decode_meal(&response)?;
                self.cache.upsert(meal.clone());
                Ok(ApiEnvelope {
                    success: true,
                    message: response.message(),
                    data: Some(meal),
                })
            }
            Err(SyncError::TransientNetwork(reason)) => {
                info!(%reason, "create failed in transit, saving offline");
                Ok(self.create_offline(&draft))
            }
            Err(e) => Err(e),
        }
    }

    /// Lists one page of meals.
    ///
    /// Online, page 1 refreshes the cache (keeping unsynced meals) and
    /// unsynced meals are listed first. Offline, the cache is paginated
    /// locally with the same envelope shape.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AuthenticationExpired`],
    /// [`SyncError::ValidationFailed`] or [`SyncError::Unknown`].
    pub async fn list_meals(&self, page: u32, limit: u32) -> SyncResult<ApiEnvelope<MealPage<Meal>>> {
        let page = page.max(1);
        let limit = if limit == 0 { self.config.page_size } else { limit };

        if !self.connectivity.is_online() {
            return Ok(self.list_offline(page, limit));
        }

        let request = ApiRequest::get(MEALS_ENDPOINT)
            .with_query("page", page)
            .with_query("limit", limit);

        let response = match self.send_authorized(request).await {
            Ok(response) => response,
            Err(SyncError::TransientNetwork(reason)) => {
                info!(%reason, "listing failed in transit, serving cache");
                return Ok(self.list_offline(page, limit));
            }
            Err(e) => return Err(e),
        };

        let envelope: ApiEnvelope<MealPage<RemoteMeal>> = response
            .envelope()
            .map_err(|e| SyncError::unknown(Some(response.status), e.to_string()))?;
        let Some(remote) = envelope.data else {
            return Err(SyncError::unknown(
                Some(response.status),
                "listing response carried no data",
            ));
        };

        let meals: Vec<Meal> = remote.meals.into_iter().map(Meal::from).collect();
        let meals = if page == 1 {
            self.cache.merge_remote(meals.clone());
            let mut listed = self.cache.get_local_only();
            listed.extend(meals);
            listed
        } else {
            self.cache.upsert_many(meals.clone());
            meals
        };

        Ok(ApiEnvelope {
            success: true,
            message: envelope.message,
            data: Some(MealPage {
                meals,
                pagination: remote.pagination,
            }),
        })
    }

    /// Applies a partial update to a meal.
    ///
    /// Updating a meal that has not reached the server yet folds the change
    /// into its queued create.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ValidationFailed`] for an empty patch or an
    /// unknown pending meal, plus the errors of [`RequestGateway::create_meal`].
    pub async fn update_meal(
        &self,
        identifier: &str,
        patch: MealPatch,
    ) -> SyncResult<ApiEnvelope<Meal>> {
        if patch.is_empty() {
            return Err(SyncError::ValidationFailed {
                status: 400,
                message: "No fields to update".into(),
            });
        }

        if self.is_pending(identifier) {
            return self.update_pending(identifier, &patch);
        }

        if !self.connectivity.is_online() {
            return Ok(self.update_offline(identifier, &patch));
        }

        let request = ApiRequest::put_json(meal_endpoint(identifier), patch.to_value());
        match self.send_authorized(request).await {
            Ok(response) => {
                let meal = decode_meal(&response)?;
                self.cache.upsert(meal.clone());
                Ok(ApiEnvelope {
                    success: true,
                    message: response.message(),
                    data: Some(meal),
                })
            }
            Err(SyncError::TransientNetwork(reason)) => {
                info!(%reason, id = identifier, "update failed in transit, saving offline");
                Ok(self.update_offline(identifier, &patch))
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes a meal.
    ///
    /// The meal leaves the cache immediately. Deleting a meal that has not
    /// reached the server yet cancels its queued create.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AuthenticationExpired`],
    /// [`SyncError::ValidationFailed`] or [`SyncError::Unknown`].
    pub async fn delete_meal(&self, identifier: &str) -> SyncResult<ApiEnvelope<()>> {
        if self.is_pending(identifier) {
            self.delete_pending(identifier);
            return Ok(ApiEnvelope::ok_with_message((), "Meal deleted"));
        }

        if !self.connectivity.is_online() {
            return Ok(self.delete_offline(identifier));
        }

        match self.send_authorized(ApiRequest::delete(meal_endpoint(identifier))).await {
            Ok(response) => {
                self.cache.remove(identifier);
                Ok(ApiEnvelope {
                    success: true,
                    message: response.message().or_else(|| Some("Meal deleted".into())),
                    data: Some(()),
                })
            }
            Err(SyncError::TransientNetwork(reason)) => {
                info!(%reason, id = identifier, "delete failed in transit, queueing");
                Ok(self.delete_offline(identifier))
            }
            Err(e @ SyncError::ValidationFailed { status: 404, .. }) => {
                self.cache.remove(identifier);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-issues a queued mutation through the online path only.
    ///
    /// Returns the authoritative meal for creates and updates when the
    /// server's answer carries one.
    ///
    /// # Errors
    ///
    /// Any failure, including an unreachable server, is returned; the
    /// caller does the retry bookkeeping.
    pub async fn replay(&self, mutation: &QueuedMutation) -> SyncResult<Option<Meal>> {
        let request = match mutation.kind {
            MutationKind::Create => {
                let mut payload = mutation.payload.clone();
                let image = match &mut payload {
                    Value::Object(map) => {
                        map.remove("localId");
                        map.remove("imagePath")
                            .and_then(|v| v.as_str().map(str::to_string))
                    }
                    _ => None,
                };
                create_request(&mutation.endpoint, payload, image.as_deref())
            }
            MutationKind::Update => ApiRequest::new(mutation.method, &mutation.endpoint)
                .with_body(RequestBody::Json(mutation.payload.clone())),
            MutationKind::Delete => ApiRequest::new(mutation.method, &mutation.endpoint),
        };

        let response = match self.send_authorized(request).await {
            Ok(response) => response,
            Err(SyncError::ValidationFailed { status: 404, .. })
                if mutation.kind == MutationKind::Delete =>
            {
                debug!(endpoint = %mutation.endpoint, "record already gone on the server");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if mutation.kind == MutationKind::Delete {
            return Ok(None);
        }

        match decode_meal(&response) {
            Ok(meal) => Ok(Some(meal)),
            Err(e) => {
                warn!(
                    mutation = %mutation.id,
                    error = %e,
                    "server accepted mutation but returned no readable meal"
                );
                Ok(None)
            }
        }
    }

    /// Settles a replayed create once the server has answered.
    ///
    /// Takes the create off the queue and replaces its placeholder with the
    /// confirmed meal. A create deleted while in flight is not confirmed;
    /// a delete of the new server record is queued instead. Edits folded
    /// into the create after it was sent are queued as an update of the
    /// server record.
    pub fn settle_create(&self, sent: &QueuedMutation, confirmed: Option<Meal>) {
        let _pending = self.pending.lock();
        let current = self.queue.take(&sent.id);

        let Some(local_id) = sent.local_id() else {
            if let Some(meal) = confirmed {
                self.cache.upsert(meal);
            }
            return;
        };

        match (current, confirmed) {
            (None, Some(meal)) => {
                let server_id = meal.identity.as_str();
                let mutation_id = self
                    .queue
                    .enqueue(MutationDescriptor::delete(meal_endpoint(server_id)));
                info!(local_id, server_id, mutation = %mutation_id, "meal deleted while syncing, delete queued");
            }
            (None, None) => {
                warn!(local_id, "meal deleted while syncing, server id unknown");
            }
            (Some(current), Some(mut meal)) => {
                match MealPatch::changes(&sent.payload, &current.payload) {
                    Ok(patch) if !patch.is_empty() => {
                        meal.apply_patch(&patch, Utc::now());
                        let mutation_id = self.queue.enqueue(MutationDescriptor::update(
                            meal_endpoint(meal.identity.as_str()),
                            patch.to_value(),
                        ));
                        info!(local_id, mutation = %mutation_id, "meal edited while syncing, update queued");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(local_id, error = %e, "queued create payload unreadable"),
                }
                self.cache.confirm(local_id, meal);
            }
            (Some(_), None) => {
                // the next listing brings the authoritative record
                self.cache.remove(local_id);
            }
        }
    }

    /// Sends a request with the current access token, refreshing it once
    /// if the server answers 401.
    ///
    /// # Errors
    ///
    /// - [`SyncError::TransientNetwork`] if no response was received
    /// - [`SyncError::AuthenticationExpired`] if the refresh failed
    /// - [`SyncError::ValidationFailed`] for other 4xx answers
    /// - [`SyncError::Unknown`] for 5xx and anything else
    pub async fn send_authorized(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let first = self
            .send(request.clone().with_bearer(self.credentials.access_token()))
            .await?;
        if first.status != 401 {
            return classify(first);
        }

        debug!(path = %request.path, "access token rejected, refreshing");
        let token = self.refresh_tokens().await?;
        let retried = self.send(request.with_bearer(Some(token))).await?;
        if retried.status == 401 {
            warn!("request still unauthorized after token refresh");
            self.credentials.clear_tokens();
            return Err(SyncError::AuthenticationExpired);
        }
        classify(retried)
    }

    /// Rotates the token pair and returns the new access token.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TransientNetwork`] if the server cannot be
    /// reached; tokens are kept. Any other failure clears the tokens and
    /// returns [`SyncError::AuthenticationExpired`].
    pub async fn refresh_tokens(&self) -> SyncResult<String> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            warn!("no refresh token available");
            self.credentials.clear_tokens();
            return Err(SyncError::AuthenticationExpired);
        };

        let body = serde_json::to_value(RefreshRequest { refresh_token })?;
        let response = self.send(ApiRequest::post_json(REFRESH_ENDPOINT, body)).await?;

        let pair = if response.is_success() {
            response
                .envelope::<TokenPair>()
                .ok()
                .and_then(|envelope| envelope.data)
        } else {
            None
        };

        match pair {
            Some(pair) => {
                self.credentials
                    .set_tokens(&pair.access_token, &pair.refresh_token);
                debug!("token pair rotated");
                Ok(pair.access_token)
            }
            None => {
                warn!(status = response.status, "token refresh rejected");
                self.credentials.clear_tokens();
                Err(SyncError::AuthenticationExpired)
            }
        }
    }

    async fn send(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        self.transport
            .send(request)
            .await
            .map_err(|e| SyncError::TransientNetwork(e.to_string()))
    }

    fn create_offline(&self, draft: &MealDraft) -> ApiEnvelope<Meal> {
        let local_id = generate_local_id();
        let meal = Meal::pending(local_id.as_str(), draft, Utc::now());
        self.cache.upsert(meal.clone());
        let mutation_id = self.queue.enqueue(MutationDescriptor::create(
            MEALS_ENDPOINT,
            draft.to_payload(&local_id),
        ));
        info!(local_id = %local_id, mutation = %mutation_id, "meal saved offline");
        ApiEnvelope::ok_with_message(meal, OFFLINE_CREATE_MESSAGE)
    }

    fn list_offline(&self, page: u32, limit: u32) -> ApiEnvelope<MealPage<Meal>> {
        let meals = self.cache.get_all();
        ApiEnvelope::ok_with_message(MealPage::paginate(&meals, page, limit), OFFLINE_LIST_MESSAGE)
    }

    fn update_offline(&self, identifier: &str, patch: &MealPatch) -> ApiEnvelope<Meal> {
        let updated = self.cache.patch(identifier, patch);
        let mutation_id = self.queue.enqueue(MutationDescriptor::update(
            meal_endpoint(identifier),
            patch.to_value(),
        ));
        info!(id = identifier, mutation = %mutation_id, "meal update queued");
        ApiEnvelope {
            success: true,
            message: Some(OFFLINE_UPDATE_MESSAGE.into()),
            data: updated,
        }
    }

    fn is_pending(&self, identifier: &str) -> bool {
        self.cache
            .get(identifier)
            .is_some_and(|meal| meal.identity.is_pending())
    }

    fn update_pending(&self, local_id: &str, patch: &MealPatch) -> SyncResult<ApiEnvelope<Meal>> {
        let _pending = self.pending.lock();
        let Some(updated) = self.cache.patch(local_id, patch) else {
            return Err(SyncError::ValidationFailed {
                status: 404,
                message: "Meal not found".into(),
            });
        };
        if let Some(create) = self.queue.find_create_for(local_id) {
            let mut payload = create.payload;
            patch.merge_into(&mut payload);
            self.queue.amend_payload(&create.id, payload);
            debug!(local_id, mutation = %create.id, "queued create amended");
        }
        Ok(ApiEnvelope::ok_with_message(updated, OFFLINE_UPDATE_MESSAGE))
    }

    fn delete_pending(&self, local_id: &str) {
        let _pending = self.pending.lock();
        self.cache.remove(local_id);
        if let Some(create) = self.queue.find_create_for(local_id) {
            self.queue.dequeue(&create.id);
            debug!(local_id, mutation = %create.id, "queued create cancelled");
        }
    }

    fn delete_offline(&self, identifier: &str) -> ApiEnvelope<()> {
        self.cache.remove(identifier);
        let mutation_id = self
            .queue
            .enqueue(MutationDescriptor::delete(meal_endpoint(identifier)));
        info!(id = identifier, mutation = %mutation_id, "meal delete queued");
        ApiEnvelope::ok_with_message((), OFFLINE_DELETE_MESSAGE)
    }
}

fn meal_endpoint(id: &str) -> String {
    format!("{MEALS_ENDPOINT}/{id}")
}

fn create_request(endpoint: &str, payload: Value, image: Option<&str>) -> ApiRequest {
    match image {
        Some(path) => ApiRequest::new(HttpMethod::Post, endpoint).with_body(RequestBody::Multipart(
            MultipartForm::from_object(&payload).with_file(IMAGE_FIELD, path),
        )),
        None => ApiRequest::post_json(endpoint, payload),
    }
}

fn decode_meal(response: &ApiResponse) -> SyncResult<Meal> {
    let envelope: ApiEnvelope<RemoteMeal> = response
        .envelope()
        .map_err(|e| SyncError::unknown(Some(response.status), e.to_string()))?;
    envelope
        .data
        .map(Meal::from)
        .ok_or_else(|| SyncError::unknown(Some(response.status), "response carried no meal"))
}

fn classify(response: ApiResponse) -> SyncResult<ApiResponse> {
    match response.status {
        200..=299 => Ok(response),
        401 => Err(SyncError::AuthenticationExpired),
        status @ 400..=499 => Err(SyncError::ValidationFailed {
            status,
            message: response
                .message()
                .unwrap_or_else(|| "Request rejected".into()),
        }),
        status => Err(SyncError::unknown(
            Some(status),
            response
                .message()
                .unwrap_or_else(|| "Unexpected server response".into()),
        )),
    }
}
