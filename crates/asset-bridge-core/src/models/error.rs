use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::models::{AssetAction, ManagerId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    NotInstalled,
    InvalidInput,
    ParseFailure,
    Timeout,
    ProcessFailure,
    StorageFailure,
    IncompatibleVersion,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CoreError {
    pub manager: Option<ManagerId>,
    pub action: Option<AssetAction>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            manager: None,
            action: None,
            kind,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::StorageFailure, message)
    }

    pub fn manager(mut self, manager: ManagerId) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn action(mut self, action: AssetAction) -> Self {
        self.action = Some(action);
        self
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for CoreError {}
