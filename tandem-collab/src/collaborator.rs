//! Collaborator records as stored in the shared presence map.
//!
//! A record is a plain JSON object in the backend:
//!
//! ```text
//! "6f1c…" → { "userId": "u-42", "sessionId": "6f1c…",
//!             "displayName": "Ada", "color": "#d65c5c", "position": {} }
//! ```
//!
//! `position` is opaque here; cursor and selection widgets own its shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::backend::CollaboratorInfo;
use tandem_core::value::{from_json_entry, to_json_entry};
use tandem_core::{Element, Result, Synchronizable};
use uuid::Uuid;

/// One live session of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    /// Stable per human; several sessions may share it.
    pub user_id: String,
    /// Unique per session; the registry key.
    pub session_id: String,
    pub display_name: String,
    /// `#rrggbb`.
    pub color: String,
    #[serde(default)]
    pub position: Value,
}

impl Collaborator {
    /// Fresh record for a session that just joined.
    pub fn joined(info: &CollaboratorInfo, position: Value) -> Self {
        let color = if info.color.is_empty() {
            session_color(&info.session_id)
        } else {
            info.color.clone()
        };
        Self {
            user_id: info.user_id.clone(),
            session_id: info.session_id.clone(),
            display_name: info.display_name.clone(),
            color,
            position,
        }
    }

    pub fn with_position(mut self, position: Value) -> Self {
        self.position = position;
        self
    }
}

impl Element for Collaborator {
    fn to_entry(&self) -> Result<Synchronizable> {
        to_json_entry(self)
    }

    fn from_entry(entry: Synchronizable) -> Result<Self> {
        from_json_entry(entry)
    }
}

// ───────────────────────────────────────────────────────────────────
// Colors
// ───────────────────────────────────────────────────────────────────

/// Stable, visually distinct color for a session id.
///
/// UUID session ids hash directly; anything else is first mapped to a
/// name-based UUID so the same id always yields the same color.
pub fn session_color(session_id: &str) -> String {
    let id = Uuid::parse_str(session_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, session_id.as_bytes()));
    let hue = ((id.as_u128() % 360) as f32) / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_color_is_stable() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(session_color(id), session_color(id));
        assert_eq!(session_color("not-a-uuid"), session_color("not-a-uuid"));
    }

    #[test]
    fn test_session_color_format() {
        let color = session_color(&Uuid::new_v4().to_string());
        assert_eq!(color.len(), 7);
        assert!(color.starts_with('#'));
        assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hsl_primaries() {
        let (r, g, b) = hsl_to_rgb(0.0, 1.0, 0.5);
        assert!((r - 1.0).abs() < 1e-6 && g.abs() < 1e-6 && b.abs() < 1e-6);
        assert_eq!(hsl_to_rgb(0.3, 0.0, 0.4), (0.4, 0.4, 0.4));
    }

    #[test]
    fn test_joined_keeps_backend_color() {
        let info = CollaboratorInfo::new("u1", "s1", "Ada", "#123456");
        let record = Collaborator::joined(&info, json!({}));
        assert_eq!(record.color, "#123456");

        let info = CollaboratorInfo::new("u1", "s1", "Ada", "");
        let record = Collaborator::joined(&info, json!({}));
        assert_eq!(record.color, session_color("s1"));
    }

    #[test]
    fn test_record_json_shape() {
        let info = CollaboratorInfo::new("u1", "s1", "Ada", "#000000");
        let record = Collaborator::joined(&info, json!({"line": 3}));
        let entry = record.to_entry().unwrap();
        assert_eq!(
            entry.as_json(),
            Some(&json!({
                "userId": "u1",
                "sessionId": "s1",
                "displayName": "Ada",
                "color": "#000000",
                "position": {"line": 3},
            }))
        );
        assert_eq!(Collaborator::from_entry(entry).unwrap(), record);
    }
}
