use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::position::anchor::{
    CornerAnchor, Point, ScreenGeometry, Size, anchor_for, is_visible, reference_screen, resolve,
    safe_default,
};

/// Where the widget anchor lives between runs.
#[async_trait]
pub trait AnchorRepository: Send + Sync {
    async fn load(&self) -> Result<Option<CornerAnchor>, AppError>;

    async fn save(&self, anchor: &CornerAnchor) -> Result<(), AppError>;
}

/// Pretty-printed JSON file. A missing file means "never saved".
pub struct JsonFileAnchorRepository {
    path: PathBuf,
}

impl JsonFileAnchorRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AnchorRepository for JsonFileAnchorRepository {
    async fn load(&self) -> Result<Option<CornerAnchor>, AppError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::io(&self.path, e)),
        };

        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn save(&self, anchor: &CornerAnchor) -> Result<(), AppError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| AppError::io(dir, e))?;
        }

        let body = serde_json::to_vec_pretty(anchor)?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| AppError::io(&self.path, e))
    }
}

#[derive(Default)]
pub struct InMemoryAnchorRepository {
    slot: Mutex<Option<CornerAnchor>>,
}

impl InMemoryAnchorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anchor(anchor: CornerAnchor) -> Self {
        Self {
            slot: Mutex::new(Some(anchor)),
        }
    }

    pub fn stored(&self) -> Option<CornerAnchor> {
        *self.slot.lock()
    }
}

#[async_trait]
impl AnchorRepository for InMemoryAnchorRepository {
    async fn load(&self) -> Result<Option<CornerAnchor>, AppError> {
        Ok(*self.slot.lock())
    }

    async fn save(&self, anchor: &CornerAnchor) -> Result<(), AppError> {
        *self.slot.lock() = Some(*anchor);
        Ok(())
    }
}

/// Saves and restores the widget position as a corner-relative anchor.
///
/// `load` never returns an off-screen position: when the stored anchor does
/// not land on any current screen the safe default is used instead.
pub struct PositionStore<R: AnchorRepository> {
    repo: R,
    widget: Size,
    /// Last anchor written or read, so a display change can be handled
    /// without another read.
    cached: Mutex<Option<CornerAnchor>>,
}

impl<R: AnchorRepository> PositionStore<R> {
    pub fn new(repo: R, widget: Size) -> Self {
        Self {
            repo,
            widget,
            cached: Mutex::new(None),
        }
    }

    pub fn widget_size(&self) -> Size {
        self.widget
    }

    /// Persist `pos` anchored to the nearest corner of `screen`. Called on drag end.
    pub async fn save(&self, pos: Point, screen: ScreenGeometry) -> Result<CornerAnchor, AppError> {
        let anchor = anchor_for(pos, self.widget, screen);
        self.repo.save(&anchor).await?;
        *self.cached.lock() = Some(anchor);

        debug!(
            corner = ?anchor.corner,
            offset_x = anchor.offset_x,
            offset_y = anchor.offset_y,
            "widget anchor saved"
        );
        Ok(anchor)
    }

    /// Position for the current screen layout. Read or decode failures fall
    /// back to the safe default and are logged.
    pub async fn load(&self, screens: &[ScreenGeometry]) -> Point {
        let stored = match self.repo.load().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "widget anchor unreadable, using default position");
                None
            }
        };
        *self.cached.lock() = stored;

        match stored {
            Some(anchor) => self.place(&anchor, screens).0,
            None => safe_default(self.widget, screens),
        }
    }

    /// Re-place the widget after the screen layout changed and persist the
    /// anchor measured against the screen it ended up on.
    pub async fn on_display_changed(&self, screens: &[ScreenGeometry]) -> Result<Point, AppError> {
        let cached = *self.cached.lock();
        let anchor = match cached {
            Some(a) => Some(a),
            None => self.repo.load().await?,
        };

        let Some(anchor) = anchor else {
            return Ok(safe_default(self.widget, screens));
        };

        let (pos, screen) = self.place(&anchor, screens);
        let screen = match screen {
            Some(s) => s,
            None => match screens.iter().find(|s| is_visible(pos, self.widget, &[**s])) {
                Some(s) => *s,
                None => return Ok(pos),
            },
        };

        let updated = anchor_for(pos, self.widget, screen);
        if updated != anchor {
            self.repo.save(&updated).await?;
            info!(corner = ?updated.corner, "widget anchor recomputed for new display layout");
        }
        *self.cached.lock() = Some(updated);

        Ok(pos)
    }

    /// Resolved position plus the screen it was resolved against, or the safe
    /// default with no screen when the anchor would land off-screen.
    fn place(&self, anchor: &CornerAnchor, screens: &[ScreenGeometry]) -> (Point, Option<ScreenGeometry>) {
        if let Some(screen) = reference_screen(anchor, screens) {
            let pos = resolve(anchor, self.widget, screen);
            if is_visible(pos, self.widget, screens) {
                return (pos, Some(*screen));
            }
            warn!(x = pos.x, y = pos.y, "restored widget position is off-screen");
        }

        (safe_default(self.widget, screens), None)
    }
}
