//! Steam Web API client, Steam Community login and the data models they share

pub mod api;
pub mod auth;
pub mod models;

pub use api::{SteamApi, resolve_download_url};
pub use auth::{
    Credentials, GuardKind, LoginOutcome, SessionStore, SteamAuthenticator, SteamSession, encrypt_password,
};
pub use models::{AppInfo, FileDetailsResponse, GameInfo, ItemSummary, PublishedFile, WorkshopPage, WorkshopTag};
