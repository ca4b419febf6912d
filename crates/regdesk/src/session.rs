//! Stateful portal session: login, semester choice, access grant, and the
//! course verbs built on top of `submit`.
//!
//! A session exclusively owns its cookie jar, nonce, and semester token. It is
//! never shared across workers; every state-changing call takes `&mut self`.

use std::fmt;

use url::Url;

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};
use crate::extract::{extract_forms, extract_messages, extract_nonce, PortalMessages};
use crate::http::{PortalHttp, PortalResponse};
use crate::outcome::SectionId;
use crate::protocol::*;
use crate::semester::SemesterToken;

/// Portal login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where a session is in the portal's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    /// A semester token is cached.
    SemesterChosen,
    /// Access was requested but the portal's reply carried error text.
    AccessDenied,
    /// Access was requested and the reply was clean.
    Ready,
}

/// Parsed endpoints, validated once at construction.
struct Endpoints {
    logon: Url,
    registration: Url,
    semester: Url,
    email: Url,
}

/// One authenticated connection to the registration portal.
pub struct PortalSession {
    http: PortalHttp,
    endpoints: Endpoints,
    credentials: Credentials,
    season: String,
    state: SessionState,
    nonce: Option<String>,
    semester: Option<SemesterToken>,
    verbose: bool,
}

impl PortalSession {
    pub fn new(config: &PortalConfig, credentials: Credentials) -> PortalResult<Self> {
        let endpoints = Endpoints {
            logon: Url::parse(&config.urls.logon)?,
            registration: Url::parse(&config.urls.registration)?,
            semester: Url::parse(&config.urls.semester)?,
            email: Url::parse(&config.urls.email)?,
        };

        Ok(Self {
            http: PortalHttp::new(config)?,
            endpoints,
            credentials,
            season: config.season.clone(),
            state: SessionState::Unauthenticated,
            nonce: None,
            semester: None,
            verbose: config.verbose,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn semester(&self) -> Option<&SemesterToken> {
        self.semester.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Authenticate against the login page.
    ///
    /// Hidden fields of the login form (the portal's time-stamped login token)
    /// are posted back together with the credentials. On success every cookie
    /// except the auth cookie is discarded.
    pub async fn login(&mut self) -> PortalResult<()> {
        let page = self.http.fetch_page(&self.endpoints.logon).await?;
        let mut fields: Vec<(String, String)> = extract_forms(&page.body)
            .into_iter()
            .next()
            .map(|form| form.fields.into_iter().collect())
            .unwrap_or_default();
        fields.retain(|(name, _)| name != FIELD_LOGIN_USER && name != FIELD_LOGIN_PASSWORD);
        fields.push((FIELD_LOGIN_USER.to_string(), self.credentials.username.clone()));
        fields.push((FIELD_LOGIN_PASSWORD.to_string(), self.credentials.password.clone()));

        self.http
            .send_form(&self.endpoints.logon, &fields, RequestMethod::Post)
            .await?;

        let token = self
            .http
            .cookie(&self.endpoints.logon, AUTH_COOKIE)
            .ok_or_else(|| PortalError::Authentication {
                username: self.credentials.username.clone(),
                cookie: AUTH_COOKIE.to_string(),
            })?;

        let Endpoints {
            logon,
            registration,
            semester,
            email,
        } = &self.endpoints;
        self.http
            .retain_only_cookie(AUTH_COOKIE, &token, &[logon, registration, semester, email])?;

        self.state = SessionState::Authenticated;
        tracing::info!(username = %self.credentials.username, "logged in");
        Ok(())
    }

    /// Resolve and cache the semester token for `season`.
    ///
    /// No-op when a token is already cached; the first choice holds for the
    /// session's lifetime.
    pub async fn choose_semester(&mut self, season: &str) -> PortalResult<()> {
        self.require_login()?;
        if self.semester.is_some() {
            return Ok(());
        }

        let page = self.http.fetch_page(&self.endpoints.semester).await?;
        self.absorb_nonce(&page);
        let token = SemesterToken::select(&extract_forms(&page.body), season)?;

        tracing::info!(
            semester = token.submit_label(),
            term = token.term_id().unwrap_or("?"),
            "chose semester"
        );
        self.semester = Some(token);
        self.state = SessionState::SemesterChosen;
        Ok(())
    }

    /// Request registration access for the cached semester.
    ///
    /// Always pulls a fresh nonce from the semester page first. Portal messages
    /// from this step stay at debug level whatever the verbosity setting.
    pub async fn grant_access(&mut self) -> PortalResult<bool> {
        self.require_login()?;
        let label = self
            .semester
            .as_ref()
            .map(|token| token.submit_label().to_string())
            .unwrap_or_default();

        let page = self.http.fetch_page(&self.endpoints.semester).await?;
        self.absorb_nonce(&page);

        let data = vec![
            (FIELD_REQUEST, RequestCode::GrantAccess.to_string()),
            (FIELD_SUBMIT, label),
        ];
        let verbose = std::mem::replace(&mut self.verbose, false);
        let url = self.endpoints.registration.clone();
        let result = self.submit(&url, data, RequestMethod::Post).await;
        self.verbose = verbose;

        let granted = result?;
        if granted {
            self.state = SessionState::Ready;
        } else {
            tracing::warn!("registration access request was rejected");
            self.state = SessionState::AccessDenied;
        }
        Ok(granted)
    }

    /// Send `data` with the term id and current nonce, then read the reply.
    ///
    /// Returns `Ok(false)` when the reply carries error regions; that is the
    /// normal signal for a rejected action.
    pub async fn submit(
        &mut self,
        url: &Url,
        data: Vec<(&str, String)>,
        method: RequestMethod,
    ) -> PortalResult<bool> {
        let mut fields: Vec<(String, String)> = data
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        if let Some(term) = self.semester.as_ref().and_then(SemesterToken::term_id) {
            fields.push((FIELD_TERM.to_string(), term.to_string()));
        }
        if let Some(nonce) = &self.nonce {
            fields.push((FIELD_NONCE.to_string(), nonce.clone()));
        }

        let page = self.http.send_form(url, &fields, method).await?;
        self.absorb_nonce(&page);

        let messages = extract_messages(&page.body);
        self.report(&messages);
        Ok(messages.is_clean())
    }

    /// Parse `method` and [`submit`](Self::submit); only GET and POST exist.
    pub async fn submit_with(
        &mut self,
        url: &Url,
        data: Vec<(&str, String)>,
        method: &str,
    ) -> PortalResult<bool> {
        let method: RequestMethod = method.parse()?;
        self.submit(url, data, method).await
    }

    /// Add a section.
    pub async fn add(&mut self, uid: SectionId) -> PortalResult<bool> {
        self.course_verb(
            RequestCode::Add,
            vec![(FIELD_UNIQUE_ADD, uid.to_string())],
        )
        .await
    }

    /// Join a section's waitlist, optionally swapping out an enrolled section.
    pub async fn waitlist(&mut self, uid: SectionId, swap: Option<SectionId>) -> PortalResult<bool> {
        let mut data = vec![(FIELD_WAITLIST_UNIQUE, uid.to_string())];
        if let Some(swap) = swap {
            data.push((FIELD_WAITLIST_SWAP, swap.to_string()));
        }
        self.course_verb(RequestCode::Waitlist, data).await
    }

    /// Drop a section.
    pub async fn drop(&mut self, uid: SectionId) -> PortalResult<bool> {
        self.course_verb(
            RequestCode::Drop,
            vec![(FIELD_UNIQUE_DROP, uid.to_string())],
        )
        .await
    }

    /// Drop `drop` only if adding `add` succeeds.
    pub async fn swap(&mut self, add: SectionId, drop: SectionId) -> PortalResult<bool> {
        self.course_verb(
            RequestCode::Swap,
            vec![
                (FIELD_SWAP_ADD, add.to_string()),
                (FIELD_SWAP_DROP, drop.to_string()),
            ],
        )
        .await
    }

    pub async fn change_to_pass_fail(&mut self, uid: SectionId) -> PortalResult<bool> {
        self.course_verb(
            RequestCode::PassFail,
            vec![(FIELD_PASS_FAIL, uid.to_string())],
        )
        .await
    }

    /// Acknowledge the university-obligations form on the email page.
    pub async fn acknowledge_obligations(&mut self) -> PortalResult<bool> {
        self.require_login()?;
        let page = self.http.fetch_page(&self.endpoints.email).await?;
        self.absorb_nonce(&page);

        let code = RequestCode::Obligations.as_str();
        let mut method = None;
        let mut form_fields = Vec::new();
        for form in extract_forms(&page.body) {
            if form.has_value(code) {
                method = method.or(form.method);
                form_fields.extend(form.fields);
            }
        }
        let method = match method {
            Some(m) => m.parse()?,
            None => RequestMethod::Post,
        };

        let season = self.season.clone();
        self.choose_semester(&season).await?;

        // Request code and acknowledgement are set below; term and nonce by `submit`.
        let form_fields: Vec<(String, String)> = form_fields
            .into_iter()
            .filter(|(name, _)| {
                ![FIELD_REQUEST, FIELD_ACK_DEGREE_PLAN, FIELD_NONCE, FIELD_TERM].contains(&name.as_str())
            })
            .collect();
        let mut data: Vec<(&str, String)> = vec![
            (FIELD_REQUEST, code.to_string()),
            (FIELD_ACK_DEGREE_PLAN, "true".to_string()),
        ];
        data.extend(form_fields.iter().map(|(n, v)| (n.as_str(), v.clone())));

        let url = self.endpoints.email.clone();
        self.submit(&url, data, method).await
    }

    async fn course_verb(&mut self, code: RequestCode, mut data: Vec<(&str, String)>) -> PortalResult<bool> {
        let season = self.season.clone();
        self.choose_semester(&season).await?;
        self.grant_access().await?;

        data.insert(0, (FIELD_REQUEST, code.to_string()));
        data.push((FIELD_SUBMIT, SUBMIT_LABEL.to_string()));

        let url = self.endpoints.registration.clone();
        let accepted = self.submit(&url, data, RequestMethod::Get).await;
        self.state = SessionState::SemesterChosen;

        let accepted = accepted?;
        tracing::debug!(request = %code, accepted, "course request submitted");
        Ok(accepted)
    }

    fn require_login(&self) -> PortalResult<()> {
        match self.state {
            SessionState::Unauthenticated => Err(PortalError::NotAuthenticated),
            _ => Ok(()),
        }
    }

    /// Replace the nonce if the page carries one; keep the old one otherwise.
    fn absorb_nonce(&mut self, page: &PortalResponse) {
        match extract_nonce(&page.body) {
            Some(nonce) => self.nonce = Some(nonce),
            None => tracing::debug!(
                url = %page.final_url,
                status = page.status,
                "no nonce in response"
            ),
        }
    }

    fn report(&self, messages: &PortalMessages) {
        for msg in &messages.notifications {
            if self.verbose {
                tracing::info!("{msg}");
            } else {
                tracing::debug!("{msg}");
            }
        }
        for msg in &messages.errors {
            if self.verbose {
                tracing::warn!("{msg}");
            } else {
                tracing::debug!("{msg}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalUrls;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("bevo", "hook-em");
        let debug = format!("{creds:?}");
        assert!(debug.contains("bevo"));
        assert!(!debug.contains("hook-em"));
    }

    #[test]
    fn test_new_session_is_unauthenticated() {
        let session = PortalSession::new(&PortalConfig::default(), Credentials::new("u", "p")).unwrap();
        assert_eq!(session.state(), SessionState::Unauthenticated);
        assert!(session.nonce().is_none());
        assert!(session.semester().is_none());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config = PortalConfig::default();
        config.urls.registration = "not a url".to_string();
        let err = PortalSession::new(&config, Credentials::new("u", "p"))
            .err()
            .unwrap();
        assert!(matches!(err, PortalError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_verbs_require_login() {
        let mut session =
            PortalSession::new(&PortalConfig::default(), Credentials::new("u", "p")).unwrap();
        let err = session.add(SectionId::new(12345)).await.unwrap_err();
        assert!(matches!(err, PortalError::NotAuthenticated));
    }

    /// Verbose session already past login, pointed at `server`.
    async fn verbose_session(server: &MockServer) -> PortalSession {
        Mock::given(method("GET"))
            .and(path("/registration/chooseSemester.WBX"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<input type="hidden" name="s_nonce" value="n1">"#,
            ))
            .mount(server)
            .await;

        let config = PortalConfig {
            urls: PortalUrls::rooted_at(&server.uri()),
            verbose: true,
            ..PortalConfig::default()
        };
        let mut session = PortalSession::new(&config, Credentials::new("u", "p")).unwrap();
        session.state = SessionState::SemesterChosen;
        session
    }

    #[tokio::test]
    async fn test_grant_access_restores_verbosity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registration/registration.WBX"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<span class="notification">Access granted</span>"#,
            ))
            .mount(&server)
            .await;

        let mut session = verbose_session(&server).await;
        assert!(session.grant_access().await.unwrap());

        assert!(session.is_verbose());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_grant_access_restores_verbosity_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registration/registration.WBX"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut session = verbose_session(&server).await;
        let err = session.grant_access().await.unwrap_err();

        assert!(matches!(err, PortalError::Status { status: 503, .. }));
        assert!(session.is_verbose());
    }

    #[tokio::test]
    async fn test_grant_access_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/registration/registration.WBX"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<form action="/registration/registrationAccessError.WBX">Not yet</form>"#,
            ))
            .mount(&server)
            .await;

        let mut session = verbose_session(&server).await;
        assert!(!session.grant_access().await.unwrap());

        assert_eq!(session.state(), SessionState::AccessDenied);
        assert!(session.is_verbose());
        assert_eq!(session.nonce(), Some("n1"));
    }

    #[tokio::test]
    async fn test_submit_with_rejects_unknown_method() {
        let mut session =
            PortalSession::new(&PortalConfig::default(), Credentials::new("u", "p")).unwrap();
        let url = Url::parse("https://portal.test/registration.WBX").unwrap();
        let err = session.submit_with(&url, Vec::new(), "PATCH").await.unwrap_err();
        assert!(matches!(err, PortalError::UnsupportedRequest(m) if m == "PATCH"));
    }
}
