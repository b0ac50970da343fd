use crate::auth::{self, SignupForm};
use crate::config::Config;
use crate::db::DbConnection;
use crate::error::{Error, Result, ValidationError};
use crate::generator::Describer;
use crate::intake;
use crate::ledger;
use crate::models::{StoredImage, User};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Login,
    Signup,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    LoginSucceeded,
    OpenSignup,
    SignupSucceeded,
    BackToLogin,
    Logout { confirmed: bool },
}

impl Screen {
    /// Transitions that do not apply to the current screen leave it unchanged.
    pub fn next(self, transition: Transition) -> Screen {
        match (self, transition) {
            (Screen::Login, Transition::LoginSucceeded) => Screen::Dashboard,
            (Screen::Login, Transition::OpenSignup) => Screen::Signup,
            (Screen::Signup, Transition::SignupSucceeded) => Screen::Login,
            (Screen::Signup, Transition::BackToLogin) => Screen::Login,
            (Screen::Dashboard, Transition::Logout { confirmed: true }) => Screen::Login,
            (screen, _) => screen,
        }
    }
}

/// What the dashboard currently shows for one logged-in user.
pub struct Dashboard {
    user: User,
    selected: Option<StoredImage>,
    caption: String,
    description: String,
    status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub screen: Screen,
    pub username: String,
    pub is_admin: bool,
    pub selected_image: Option<String>,
    pub original_name: Option<String>,
    pub caption: String,
    pub description: String,
    pub status: String,
}

impl Dashboard {
    pub fn new(user: User) -> Self {
        Self {
            user,
            selected: None,
            caption: String::new(),
            description: String::new(),
            status: "Ready".to_string(),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn selected(&self) -> Option<&StoredImage> {
        self.selected.as_ref()
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Copies the file at `source` into the owned directory and selects the copy.
    pub async fn select_image(&mut self, source: &Path, image_dir: &Path) -> Result<()> {
        let stored = intake::store(source, &self.user.username, image_dir).await?;
        self.show_selection(stored);
        Ok(())
    }

    /// Same as [`Dashboard::select_image`] for bytes uploaded by the front-end.
    pub async fn accept_upload(
        &mut self,
        bytes: &[u8],
        file_name: &str,
        image_dir: &Path,
    ) -> Result<()> {
        let stored = intake::store_bytes(bytes, file_name, &self.user.username, image_dir).await?;
        self.show_selection(stored);
        Ok(())
    }

    fn show_selection(&mut self, stored: StoredImage) {
        self.status = format!("Selected {} — ready to generate", stored.file_name());
        self.caption.clear();
        self.description.clear();
        self.selected = Some(stored);
    }

    /// Fills caption and description from `describer`. On failure the
    /// previous text is kept.
    pub async fn generate(&mut self, describer: &dyn Describer) -> Result<()> {
        let image = self
            .selected
            .clone()
            .ok_or(ValidationError::NoImageSelected)?;

        self.status = "Generating caption — this may take a moment...".to_string();
        info!("Generating text for {} with {}", image.file_name(), describer.name());

        match describer.describe(image.path(), image.original_name()).await {
            Ok(generation) => {
                self.description = if generation.description.is_empty() {
                    generation.caption.clone()
                } else {
                    generation.description
                };
                self.caption = generation.caption;
                self.status = "Generation complete — review then Save to DB".to_string();
                Ok(())
            }
            Err(e) => {
                warn!("Generation failed for {}: {e}", image.file_name());
                self.status = "Generation failed".to_string();
                Err(e)
            }
        }
    }

    /// Replaces the shown text with hand edits. `None` leaves a field as is.
    pub fn edit_text(&mut self, caption: Option<String>, description: Option<String>) {
        if let Some(caption) = caption {
            self.caption = caption;
        }
        if let Some(description) = description {
            self.description = description;
        }
    }

    /// Persists the selected image with the text currently shown.
    pub async fn save(&mut self, conn: &DbConnection) -> Result<Uuid> {
        let image = self.selected.as_ref().ok_or(ValidationError::NoImageSelected)?;
        if self.caption.trim().is_empty() && self.description.trim().is_empty() {
            return Err(ValidationError::EmptyText.into());
        }

        self.status = "Saving to database...".to_string();
        match ledger::save_upload(conn, &self.user, image, &self.caption, &self.description).await
        {
            Ok(id) => {
                self.status = format!("Saved (id={id})");
                Ok(id)
            }
            Err(e) => {
                warn!("Saving upload failed: {e}");
                self.status = "Save failed".to_string();
                Err(e)
            }
        }
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            screen: Screen::Dashboard,
            username: self.user.username.clone(),
            is_admin: self.user.is_admin,
            selected_image: self.selected.as_ref().map(StoredImage::file_name),
            original_name: self
                .selected
                .as_ref()
                .map(|image| image.original_name().to_string()),
            caption: self.caption.clone(),
            description: self.description.clone(),
            status: self.status.clone(),
        }
    }
}

pub type SessionHandle = Arc<Mutex<Dashboard>>;

struct OpenSession {
    user_id: Uuid,
    dashboard: SessionHandle,
}

/// Process-wide dependencies plus the open dashboard sessions, keyed by token.
pub struct Shell {
    db: DbConnection,
    config: Config,
    describer: Arc<dyn Describer>,
    sessions: Mutex<HashMap<String, OpenSession>>,
}

pub type AppState = Arc<Shell>;

impl Shell {
    pub fn new(db: DbConnection, config: Config, describer: Arc<dyn Describer>) -> Self {
        Self {
            db,
            config,
            describer,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &DbConnection {
        &self.db
    }

    pub fn image_dir(&self) -> &Path {
        &self.config.image_folder
    }

    pub fn describer(&self) -> &dyn Describer {
        self.describer.as_ref()
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<(User, Screen)> {
        let user = auth::signup(&self.db, form, self.config.bcrypt_cost).await?;
        Ok((user, Screen::Signup.next(Transition::SignupSucceeded)))
    }

    /// Verifies credentials and opens a dashboard session, replacing any
    /// dashboard the user already had open.
    pub async fn login(&self, username: &str, password: &str) -> Result<(String, SessionHandle)> {
        let user = auth::login(&self.db, username, password).await?;
        let token = auth::create_auth_token(&self.db, &user.id).await?;

        info!("`{}` logged in", user.username);
        let user_id = user.id;
        let dashboard = Arc::new(Mutex::new(Dashboard::new(user)));

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, open| open.user_id != user_id);
        sessions.insert(
            token.clone(),
            OpenSession {
                user_id,
                dashboard: dashboard.clone(),
            },
        );
        Ok((token, dashboard))
    }

    /// Dashboard for `token`; tokens issued before a restart get a fresh one.
    pub async fn session(&self, token: &str) -> Result<SessionHandle> {
        if let Some(open) = self.sessions.lock().await.get(token) {
            return Ok(open.dashboard.clone());
        }

        let user_id = auth::verify_auth_token(&self.db, token).await?;
        let user = auth::get_user(&self.db, &user_id).await.map_err(|e| match e {
            Error::NotFound => Error::Unauthorized,
            other => other,
        })?;

        let mut sessions = self.sessions.lock().await;
        let open = sessions
            .entry(token.to_string())
            .or_insert_with(|| OpenSession {
                user_id: user.id,
                dashboard: Arc::new(Mutex::new(Dashboard::new(user))),
            });
        Ok(open.dashboard.clone())
    }

    /// Ends the session only when `confirmed`; otherwise the dashboard stays open.
    pub async fn logout(&self, token: &str, confirmed: bool) -> Result<Screen> {
        let session = self.session(token).await?;
        let screen = Screen::Dashboard.next(Transition::Logout { confirmed });
        if screen == Screen::Dashboard {
            return Ok(screen);
        }

        auth::delete_auth_token(&self.db, token).await?;
        self.sessions.lock().await.remove(token);
        info!("`{}` logged out", session.lock().await.user().username);
        Ok(screen)
    }
}
