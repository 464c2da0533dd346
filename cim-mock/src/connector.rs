use std::sync::{Arc, Mutex, PoisonError};

use cim_core::{ConnectTarget, Credentials, Result, WbemConnector, WbemError};

use crate::repository::MockWbem;

/// Connector handing out a shared [`MockWbem`].
///
/// Records every connection attempt and can be told to fail the next one.
pub struct MockConnector {
    wbem: Arc<MockWbem>,
    fail_with: Mutex<Option<WbemError>>,
    attempts: Mutex<Vec<(ConnectTarget, String)>>,
}

impl MockConnector {
    pub fn new(wbem: Arc<MockWbem>) -> Self {
        Self {
            wbem,
            fail_with: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, error: WbemError) {
        *self.fail_with.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Targets and usernames of all connection attempts.
    pub fn attempts(&self) -> Vec<(ConnectTarget, String)> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WbemConnector for MockConnector {
    type Client = Arc<MockWbem>;

    async fn connect(&self, target: &ConnectTarget, credentials: &Credentials) -> Result<Self::Client> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target.clone(), credentials.username.clone()));
        if let Some(err) = self
            .fail_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(err);
        }
        Ok(Arc::clone(&self.wbem))
    }
}
