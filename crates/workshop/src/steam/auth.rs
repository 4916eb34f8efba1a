//! Steam Community login
//!
//! The login handshake has two steps. `getrsakey` returns a per-account RSA
//! public key, and `dologin` takes the password encrypted with it. The reply
//! either logs in or asks for a captcha or a Steam Guard code. The caller
//! retries with the requested extra input.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::error::{FileOperation, Result, WorkshopError};

const LOGIN_FRIENDLY_NAME: &str = "Steam Workshop Downloader";
const RSA_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Receives human-readable login stages
pub type AuthProgress = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardKind {
    /// Code mailed to the account address
    Email,
    /// Code from the mobile authenticator
    TwoFactor,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub guard_code: Option<String>,
    /// Which field the guard code answers; e-mail when unset
    pub guard_kind: Option<GuardKind>,
    pub captcha_gid: Option<String>,
    pub captcha_text: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_guard_code(mut self, code: impl Into<String>, kind: GuardKind) -> Self {
        self.guard_code = Some(code.into());
        self.guard_kind = Some(kind);
        self
    }

    pub fn with_captcha(mut self, gid: impl Into<String>, text: impl Into<String>) -> Self {
        self.captcha_gid = Some(gid.into());
        self.captcha_text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success(SteamSession),
    CaptchaRequired { gid: String, image_url: String },
    GuardCodeRequired { kind: GuardKind },
    Failed { message: String },
}

/// A logged-in community session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteamSession {
    pub username: String,
    pub steam_id: Option<String>,
    pub cookies: BTreeMap<String, String>,
    pub success: bool,
    /// Unix seconds
    pub created_at: i64,
}

impl SteamSession {
    pub fn is_valid(&self) -> bool {
        self.success && !self.cookies.is_empty()
    }

    /// Write the session as JSON, readable by the owner only on unix
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WorkshopError::fs(parent, FileOperation::CreateDir, e))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| WorkshopError::Json {
            context: "serializing session".to_string(),
            source: e,
        })?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // Born owner-only, so the tokens are never readable by others
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .map_err(|e| WorkshopError::fs(path, FileOperation::Create, e))?;

        // `mode` only applies to new files; tighten one left by an older version
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| WorkshopError::fs(path, FileOperation::Write, e))?;
        }

        file.write_all(text.as_bytes())
            .map_err(|e| WorkshopError::fs(path, FileOperation::Write, e))?;

        debug!("Saved session for {} to {}", self.username, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn clear(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkshopError::fs(path, FileOperation::Delete, e)),
        }
    }

    /// Client that sends this session's cookies to the community site
    pub fn http_client(&self, user_agent: &str, community_url: &str) -> Result<Client> {
        let url = url::Url::parse(community_url).map_err(|e| WorkshopError::InvalidUrl {
            url: community_url.to_string(),
            suggestion: e.to_string(),
        })?;

        let jar = Arc::new(Jar::default());
        for (name, value) in &self.cookies {
            jar.add_cookie_str(&format!("{}={}; Path=/", name, value), &url);
        }

        Client::builder()
            .user_agent(user_agent)
            .cookie_provider(jar)
            .build()
            .map_err(|e| WorkshopError::Auth {
                message: format!("Failed to create session client: {}", e),
            })
    }
}

#[derive(Debug, Deserialize)]
struct RsaKeyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    publickey_mod: String,
    #[serde(default)]
    publickey_exp: String,
    #[serde(default)]
    timestamp: String,
}

pub struct SteamAuthenticator {
    client: Client,
    jar: Arc<Jar>,
    community_url: String,
    progress: Option<AuthProgress>,
}

impl SteamAuthenticator {
    pub fn new(community_url: &str, user_agent: &str) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| WorkshopError::Auth {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            jar,
            community_url: community_url.trim_end_matches('/').to_string(),
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: AuthProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, stage: &str) {
        info!("Steam login: {}", stage);
        if let Some(ref progress) = self.progress {
            progress(stage);
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(WorkshopError::Auth {
                message: "username and password are required".to_string(),
            });
        }

        self.report("Connecting");
        let key = self.fetch_rsa_key(&credentials.username).await?;

        self.report("Encrypting");
        let encrypted = encrypt_password(&credentials.password, &key.publickey_mod, &key.publickey_exp)?;

        self.report("Sending credentials");
        let reply = self.do_login(credentials, &encrypted, &key.timestamp).await?;

        let outcome = classify_login(&reply, &credentials.username, &self.community_url, || {
            self.session_cookies()
        });
        match &outcome {
            LoginOutcome::Success(_) => self.report("Authenticated"),
            LoginOutcome::CaptchaRequired { .. } => debug!("Steam asked for a captcha"),
            LoginOutcome::GuardCodeRequired { kind } => debug!("Steam asked for a {:?} guard code", kind),
            LoginOutcome::Failed { message } => warn!("Steam login failed: {}", message),
        }
        Ok(outcome)
    }

    async fn fetch_rsa_key(&self, username: &str) -> Result<RsaKeyResponse> {
        let url = format!("{}/login/getrsakey/", self.community_url);
        let response = self
            .client
            .post(&url)
            .timeout(RSA_TIMEOUT)
            .form(&[("username", username)])
            .send()
            .await
            .map_err(WorkshopError::from)?;

        if !response.status().is_success() {
            return Err(WorkshopError::Auth {
                message: format!("RSA key request failed with status {}", response.status()),
            });
        }

        let key: RsaKeyResponse = response.json().await.map_err(|e| WorkshopError::Auth {
            message: format!("Unreadable RSA key response: {}", e),
        })?;
        if !key.success || key.publickey_mod.is_empty() || key.publickey_exp.is_empty() {
            return Err(WorkshopError::Auth {
                message: "Could not get the encryption key".to_string(),
            });
        }
        Ok(key)
    }

    async fn do_login(&self, credentials: &Credentials, encrypted_password: &str, timestamp: &str) -> Result<Value> {
        let url = format!("{}/login/dologin/", self.community_url);
        let guard_code = credentials.guard_code.clone().unwrap_or_default();
        let (emailauth, twofactorcode) = match credentials.guard_kind {
            Some(GuardKind::TwoFactor) => (String::new(), guard_code),
            _ => (guard_code, String::new()),
        };
        let donotcache = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
            .to_string();

        let form = [
            ("username", credentials.username.clone()),
            ("password", encrypted_password.to_string()),
            ("emailauth", emailauth),
            ("twofactorcode", twofactorcode),
            ("loginfriendlyname", LOGIN_FRIENDLY_NAME.to_string()),
            ("captchagid", credentials.captcha_gid.clone().unwrap_or_else(|| "-1".to_string())),
            ("captcha_text", credentials.captcha_text.clone().unwrap_or_default()),
            ("emailsteamid", String::new()),
            ("rsatimestamp", timestamp.to_string()),
            ("remember_login", "false".to_string()),
            ("donotcache", donotcache),
        ];

        let response = self
            .client
            .post(&url)
            .timeout(LOGIN_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(WorkshopError::from)?;

        if !response.status().is_success() {
            return Err(WorkshopError::Auth {
                message: format!("Login request failed with status {}", response.status()),
            });
        }

        response.json().await.map_err(|e| WorkshopError::Auth {
            message: format!("Unreadable login response: {}", e),
        })
    }

    fn session_cookies(&self) -> BTreeMap<String, String> {
        let Ok(url) = url::Url::parse(&self.community_url) else {
            return BTreeMap::new();
        };
        self.jar
            .cookies(&url)
            .and_then(|header| header.to_str().ok().map(parse_cookie_header))
            .unwrap_or_default()
    }
}

/// RSA PKCS#1 v1.5 encryption with a hex modulus and exponent, base64 output
pub fn encrypt_password(password: &str, modulus_hex: &str, exponent_hex: &str) -> Result<String> {
    let decode = |what: &str, value: &str| {
        // Steam sends odd-length exponents such as "10001"
        let padded = if value.len() % 2 == 1 { format!("0{}", value) } else { value.to_string() };
        hex::decode(padded).map_err(|e| WorkshopError::Auth {
            message: format!("Invalid RSA {}: {}", what, e),
        })
    };

    let n = BigUint::from_bytes_be(&decode("modulus", modulus_hex)?);
    let e = BigUint::from_bytes_be(&decode("exponent", exponent_hex)?);
    let key = RsaPublicKey::new(n, e).map_err(|e| WorkshopError::Auth {
        message: format!("Invalid RSA key: {}", e),
    })?;

    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Pkcs1v15Encrypt, password.as_bytes())
        .map_err(|e| WorkshopError::Auth {
            message: format!("Password encryption failed: {}", e),
        })?;

    Ok(BASE64.encode(ciphertext))
}

/// Turn a `dologin` reply into an outcome; cookies are only read on success
fn classify_login(
    reply: &Value,
    username: &str,
    community_url: &str,
    cookies: impl FnOnce() -> BTreeMap<String, String>,
) -> LoginOutcome {
    let flag = |name: &str| reply.get(name).and_then(Value::as_bool).unwrap_or(false);
    let message = reply.get("message").and_then(Value::as_str).unwrap_or("").to_string();
    let lowered = message.to_lowercase();

    let captcha_gid = reply.get("captcha_gid").and_then(|gid| match gid {
        Value::String(s) if !s.is_empty() && s != "-1" => Some(s.clone()),
        Value::Number(n) if n.as_i64() != Some(-1) => Some(n.to_string()),
        _ => None,
    });

    if flag("success") {
        let steam_id = reply
            .get("transfer_parameters")
            .and_then(|p| p.get("steamid"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        return LoginOutcome::Success(SteamSession {
            username: username.to_string(),
            steam_id,
            cookies: cookies(),
            success: true,
            created_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default(),
        });
    }

    let captcha_asked = flag("captcha_needed") || lowered.contains("captcha");
    if let (true, Some(gid)) = (captcha_asked, captcha_gid) {
        let image_url = format!("{}/login/rendercaptcha/?gid={}", community_url.trim_end_matches('/'), gid);
        return LoginOutcome::CaptchaRequired { gid, image_url };
    }

    if flag("requires_twofactor") {
        return LoginOutcome::GuardCodeRequired { kind: GuardKind::TwoFactor };
    }
    if flag("emailauth_needed") || lowered.contains("guard") || lowered.contains("code") {
        return LoginOutcome::GuardCodeRequired { kind: GuardKind::Email };
    }

    LoginOutcome::Failed {
        message: if message.is_empty() { "Unknown error".to_string() } else { message },
    }
}

fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (!name.is_empty()).then(|| (name.to_string(), value.to_string()))
        })
        .collect()
}

/// Keeps the remembered session and its file in sync
pub struct SessionStore {
    path: PathBuf,
    session: Option<SteamSession>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved session, keeping it only when it is still usable
    pub fn authenticate_saved(&mut self) -> Option<&SteamSession> {
        match SteamSession::load(&self.path) {
            Some(session) if session.is_valid() => {
                info!("Restored Steam session for {}", session.username);
                self.session = Some(session);
            }
            Some(_) => {
                debug!("Saved session at {} is not valid", self.path.display());
                self.session = None;
            }
            None => self.session = None,
        }
        self.session.as_ref()
    }

    /// Hold `session`, writing it to disk when `remember` is set
    pub fn store(&mut self, session: SteamSession, remember: bool) -> Result<()> {
        if remember {
            session.save(&self.path)?;
        }
        self.session = Some(session);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            info!("Logged out {}", session.username);
        }
        SteamSession::clear(&self.path)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&SteamSession> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_key() -> RsaPrivateKey {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 512).unwrap()
    }

    fn sample_session() -> SteamSession {
        let mut cookies = BTreeMap::new();
        cookies.insert("steamLoginSecure".to_string(), "abc".to_string());
        SteamSession {
            username: "gaben".to_string(),
            steam_id: Some("76561197960287930".to_string()),
            cookies,
            success: true,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_encrypt_password_decrypts_with_private_key() {
        let private = test_key();
        let public = private.to_public_key();
        let modulus = hex::encode(public.n().to_bytes_be());
        let exponent = hex::encode(public.e().to_bytes_be());

        let encrypted = encrypt_password("hunter2", &modulus, &exponent).unwrap();
        let ciphertext = BASE64.decode(encrypted).unwrap();
        let plain = private.decrypt(Pkcs1v15Encrypt, &ciphertext).unwrap();
        assert_eq!(plain, b"hunter2");
    }

    #[test]
    fn test_encrypt_password_rejects_bad_hex() {
        assert!(matches!(
            encrypt_password("pw", "zz", "010001"),
            Err(WorkshopError::Auth { .. })
        ));
    }

    #[test]
    fn test_classify_login_replies() {
        let none = || BTreeMap::new();
        let base = "https://steamcommunity.com";

        match classify_login(&json!({"success": true, "transfer_parameters": {"steamid": "765"}}), "u", base, none) {
            LoginOutcome::Success(session) => {
                assert_eq!(session.steam_id.as_deref(), Some("765"));
                assert!(!session.is_valid());
            }
            other => panic!("Expected success, got {:?}", other),
        }

        match classify_login(&json!({"success": false, "captcha_needed": true, "captcha_gid": "42"}), "u", base, none) {
            LoginOutcome::CaptchaRequired { gid, image_url } => {
                assert_eq!(gid, "42");
                assert_eq!(image_url, "https://steamcommunity.com/login/rendercaptcha/?gid=42");
            }
            other => panic!("Expected captcha, got {:?}", other),
        }

        assert_eq!(
            classify_login(&json!({"success": false, "emailauth_needed": true}), "u", base, none),
            LoginOutcome::GuardCodeRequired { kind: GuardKind::Email }
        );
        assert_eq!(
            classify_login(&json!({"success": false, "requires_twofactor": true}), "u", base, none),
            LoginOutcome::GuardCodeRequired { kind: GuardKind::TwoFactor }
        );
        assert_eq!(
            classify_login(&json!({"success": false, "message": "Enter the Steam Guard code"}), "u", base, none),
            LoginOutcome::GuardCodeRequired { kind: GuardKind::Email }
        );
        assert_eq!(
            classify_login(&json!({"success": false, "message": "Wrong password"}), "u", base, none),
            LoginOutcome::Failed { message: "Wrong password".to_string() }
        );
        assert_eq!(
            classify_login(&json!({"success": false}), "u", base, none),
            LoginOutcome::Failed { message: "Unknown error".to_string() }
        );
    }

    #[test]
    fn test_captcha_message_without_gid_is_failure() {
        let outcome = classify_login(
            &json!({"success": false, "message": "Please verify the captcha", "captcha_gid": -1}),
            "u",
            "https://steamcommunity.com",
            BTreeMap::new,
        );
        assert_eq!(outcome, LoginOutcome::Failed { message: "Please verify the captcha".to_string() });
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("sessionid=abc; steamLoginSecure=x%7Cy; broken");
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["steamLoginSecure"], "x%7Cy");
    }

    #[tokio::test]
    async fn test_empty_credentials_fail_before_network() {
        let server = MockServer::start().await;
        let auth = SteamAuthenticator::new(&server.uri(), "test").unwrap();

        let result = auth.login(&Credentials::new("", "pw")).await;
        assert!(matches!(result, Err(WorkshopError::Auth { .. })));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_flow_with_cookies() {
        let private = test_key();
        let public = private.to_public_key();
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login/getrsakey/"))
            .and(body_string_contains("username=gaben"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "publickey_mod": hex::encode(public.n().to_bytes_be()),
                "publickey_exp": "010001",
                "timestamp": "1234"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/dologin/"))
            .and(body_string_contains("rsatimestamp=1234"))
            .and(body_string_contains("twofactorcode=ABCDE"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "steamLoginSecure=token; Path=/")
                    .set_body_json(json!({
                        "success": true,
                        "transfer_parameters": {"steamid": "76561197960287930"}
                    })),
            )
            .mount(&server)
            .await;

        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = stages.clone();
        let auth = SteamAuthenticator::new(&server.uri(), "test")
            .unwrap()
            .with_progress(Arc::new(move |stage| sink.lock().unwrap().push(stage.to_string())));

        let credentials = Credentials::new("gaben", "hunter2").with_guard_code("ABCDE", GuardKind::TwoFactor);
        match auth.login(&credentials).await.unwrap() {
            LoginOutcome::Success(session) => {
                assert!(session.is_valid());
                assert_eq!(session.cookies["steamLoginSecure"], "token");
                assert_eq!(session.steam_id.as_deref(), Some("76561197960287930"));
            }
            other => panic!("Expected success, got {:?}", other),
        }

        assert_eq!(
            *stages.lock().unwrap(),
            vec!["Connecting", "Encrypting", "Sending credentials", "Authenticated"]
        );
    }

    #[tokio::test]
    async fn test_rsa_key_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/getrsakey/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let auth = SteamAuthenticator::new(&server.uri(), "test").unwrap();
        let result = auth.login(&Credentials::new("gaben", "pw")).await;
        assert!(matches!(result, Err(WorkshopError::Auth { .. })));
    }

    #[test]
    fn test_session_file_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth").join("session.json");
        let session = sample_session();

        session.save(&path).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
        assert_eq!(SteamSession::load(&path), Some(session));

        SteamSession::clear(&path).unwrap();
        assert!(SteamSession::load(&path).is_none());
        SteamSession::clear(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_save_tightens_existing_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let session = sample_session();
        session.save(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(SteamSession::load(&path), Some(session));
    }

    #[test]
    fn test_session_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut store = SessionStore::new(&path);
        assert!(store.authenticate_saved().is_none());

        let mut invalid = sample_session();
        invalid.cookies.clear();
        invalid.save(&path).unwrap();
        assert!(store.authenticate_saved().is_none());

        store.store(sample_session(), true).unwrap();
        let mut reopened = SessionStore::new(&path);
        assert_eq!(reopened.authenticate_saved().map(|s| s.username.as_str()), Some("gaben"));
        assert!(reopened.is_authenticated());

        reopened.logout().unwrap();
        assert!(!reopened.is_authenticated());
        assert!(!path.exists());
    }

    #[test]
    fn test_session_http_client_builds() {
        let client = sample_session().http_client("test", "https://steamcommunity.com");
        assert!(client.is_ok());
        assert!(sample_session().http_client("test", "not a url").is_err());
    }
}
