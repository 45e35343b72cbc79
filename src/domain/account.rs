use serde::{Deserialize, Serialize};

pub const DEFAULT_INOREADER_SERVER: &str = "https://www.inoreader.com";

fn default_inoreader_server() -> String {
    DEFAULT_INOREADER_SERVER.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Ttrss,
    Inoreader,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackendKind::Local => "local",
            BackendKind::Ttrss => "ttrss",
            BackendKind::Inoreader => "inoreader",
        };
        f.write_str(name)
    }
}

/// Backend selection plus whatever credentials that backend needs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backend {
    Local,
    Ttrss {
        server: String,
        username: String,
        password: String,
    },
    Inoreader {
        #[serde(default = "default_inoreader_server")]
        server: String,
        app_id: String,
        app_key: String,
        refresh_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
    },
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Local => BackendKind::Local,
            Backend::Ttrss { .. } => BackendKind::Ttrss,
            Backend::Inoreader { .. } => BackendKind::Inoreader,
        }
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Local => f.write_str("Local"),
            Backend::Ttrss {
                server, username, ..
            } => f
                .debug_struct("Ttrss")
                .field("server", server)
                .field("username", username)
                .finish_non_exhaustive(),
            Backend::Inoreader { server, app_id, .. } => f
                .debug_struct("Inoreader")
                .field("server", server)
                .field("app_id", app_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Identity of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub key: String,
    pub name: String,
    #[serde(flatten)]
    pub backend: Backend,
}

impl Account {
    pub fn local(key: &str, name: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            backend: Backend::Local,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
}
