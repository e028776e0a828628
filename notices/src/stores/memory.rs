use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::stores::{App, AppStore, NewNotice, Notice, NoticeStore, StoreError};

/// Keeps apps and notices in process memory. Used for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    apps: Arc<Mutex<HashMap<String, App>>>,
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an app and returns it.
    pub fn with_app(&self, api_key: &str, current_app_version: Option<&str>) -> App {
        let app = App {
            id: Uuid::now_v7(),
            name: api_key.to_owned(),
            api_key: api_key.to_owned(),
            current_app_version: current_app_version.map(String::from),
        };
        self.apps
            .lock()
            .expect("poisoned MemoryStore mutex")
            .insert(api_key.to_owned(), app.clone());
        app
    }

    /// Builds a store from `api_key[:current_version]` entries separated by commas.
    pub fn from_seed(seed: &str) -> Self {
        let store = Self::new();
        for entry in seed.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once(':') {
                Some((api_key, version)) => store.with_app(api_key, Some(version)),
                None => store.with_app(entry, None),
            };
        }
        store
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .expect("poisoned MemoryStore mutex")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.notices.lock().expect("poisoned MemoryStore mutex").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AppStore for MemoryStore {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<App>, StoreError> {
        Ok(self
            .apps
            .lock()
            .expect("poisoned MemoryStore mutex")
            .get(api_key)
            .cloned())
    }
}

#[async_trait]
impl NoticeStore for MemoryStore {
    async fn create(&self, notice: NewNotice) -> Result<Notice, StoreError> {
        notice.validate()?;

        let notice = Notice {
            id: Uuid::now_v7(),
            notice,
        };
        tracing::info!(id = %notice.id, "notice saved: {:?}", notice.notice.error_class);
        self.notices
            .lock()
            .expect("poisoned MemoryStore mutex")
            .push(notice.clone());

        Ok(notice)
    }
}
