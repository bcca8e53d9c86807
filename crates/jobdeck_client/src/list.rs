use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use jobdeck_core::{
    normalize, update_list, ApiError, Emitter, ListEffect, ListMsg, ListParams, ListResponse,
    ListState, Subscription,
};
use jobdeck_logging::{jobdeck_debug, jobdeck_warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{lock, Transport};

/// Remote list operation driven by a [`ListController`].
#[async_trait::async_trait]
pub trait ListFetcher: Send + Sync {
    async fn fetch(&self, params: &ListParams) -> Result<Value, ApiError>;
}

/// Fetches a list with `GET endpoint?params`.
pub struct EndpointFetcher {
    transport: Arc<dyn Transport>,
    endpoint: String,
}

impl EndpointFetcher {
    pub fn new(transport: Arc<dyn Transport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl ListFetcher for EndpointFetcher {
    async fn fetch(&self, params: &ListParams) -> Result<Value, ApiError> {
        self.transport.get(&self.endpoint, params).await
    }
}

/// Paginated list owned by one view.
///
/// Runs the effects of [`update_list`]: every fetch result goes through
/// [`normalize`] before being applied. A request issued while another is in
/// flight is ignored and returns the current response.
pub struct ListController<T> {
    fetcher: Arc<dyn ListFetcher>,
    state: Mutex<ListState<T>>,
    loading_change: Emitter<bool>,
    state_change: Emitter<ListResponse<T>>,
}

impl<T> ListController<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(fetcher: Arc<dyn ListFetcher>, page_size: u32) -> Self {
        Self::with_params(fetcher, ListParams::new(), page_size)
    }

    pub fn with_params(fetcher: Arc<dyn ListFetcher>, params: ListParams, page_size: u32) -> Self {
        Self {
            fetcher,
            state: Mutex::new(ListState::with_params(params, page_size)),
            loading_change: Emitter::new(),
            state_change: Emitter::new(),
        }
    }

    pub async fn init(&self) -> Result<ListResponse<T>, ApiError> {
        self.dispatch(ListMsg::Init).await
    }

    pub async fn load_more(&self) -> Result<ListResponse<T>, ApiError> {
        self.dispatch(ListMsg::LoadMore).await
    }

    pub async fn refresh(&self) -> Result<ListResponse<T>, ApiError> {
        self.dispatch(ListMsg::Refresh).await
    }

    pub async fn search(&self, params: ListParams) -> Result<ListResponse<T>, ApiError> {
        self.dispatch(ListMsg::Search(params)).await
    }

    /// Patches loaded items without a round-trip, e.g. live job progress.
    pub fn modify_data_source<F>(&self, updater: F)
    where
        F: FnMut(T) -> T,
    {
        let response = {
            let mut state = lock(&self.state);
            state.modify_data_source(updater);
            state.response()
        };
        self.state_change.emit(&response);
    }

    pub fn response(&self) -> ListResponse<T> {
        lock(&self.state).response()
    }

    pub fn params(&self) -> ListParams {
        lock(&self.state).params().clone()
    }

    pub fn on_loading_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.loading_change.subscribe(handler)
    }

    pub fn on_state_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ListResponse<T>) + Send + Sync + 'static,
    {
        self.state_change.subscribe(handler)
    }

    async fn dispatch(&self, msg: ListMsg<T>) -> Result<ListResponse<T>, ApiError> {
        let mut queue: VecDeque<ListEffect> = self.apply(msg).into();
        let mut failure = None;

        while let Some(effect) = queue.pop_front() {
            match effect {
                ListEffect::LoadingChanged(loading) => self.loading_change.emit(&loading),
                ListEffect::StateChanged => self.state_change.emit(&self.response()),
                ListEffect::Fetch { mode, params } => {
                    jobdeck_debug!("List fetch ({:?}) with {:?}", mode, params);
                    let in_flight = InFlight { list: self, settled: false };
                    let fetched = self.fetcher.fetch(&params).await;
                    in_flight.settle();
                    let next = match fetched {
                        Ok(raw) => {
                            let page = normalize::<T>(Some(&raw));
                            failure = page.error.clone();
                            ListMsg::Loaded(page)
                        }
                        Err(error) => {
                            failure = Some(error.clone());
                            ListMsg::Failed(error)
                        }
                    };
                    if let Some(error) = &failure {
                        jobdeck_warn!("List fetch failed: {}", error);
                    }
                    queue.extend(self.apply(next));
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(self.response()),
        }
    }
}

impl<T> ListController<T> {
    fn apply(&self, msg: ListMsg<T>) -> Vec<ListEffect> {
        let mut guard = lock(&self.state);
        let state = std::mem::take(&mut *guard);
        let (state, effects) = update_list(state, msg);
        *guard = state;
        effects
    }
}

/// Marks the fetch as abandoned when the dispatching future is dropped
/// before the fetch answers.
struct InFlight<'a, T> {
    list: &'a ListController<T>,
    settled: bool,
}

impl<T> InFlight<'_, T> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        jobdeck_debug!("List fetch cancelled");
        for effect in self.list.apply(ListMsg::Cancelled) {
            if let ListEffect::LoadingChanged(loading) = effect {
                self.list.loading_change.emit(&loading);
            }
        }
    }
}

impl<T> fmt::Debug for ListController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ListController")
            .field("phase", &state.phase())
            .field("page", &state.page())
            .field("items", &state.data_source().len())
            .finish()
    }
}
