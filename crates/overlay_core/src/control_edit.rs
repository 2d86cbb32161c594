//! Whole-record edits made from the control list, outside the overlay itself.

use shared::domain::ButtonConfig;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditRejected {
    #[error("label and key name are required")]
    MissingText,
    #[error("position must be within 0.0..=1.0 and size within (0.0, 1.0]")]
    OutOfRange,
}

/// Replacement values for every editable field of one control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEdit {
    pub label: String,
    pub key_name: String,
    pub x_percent: f32,
    pub y_percent: f32,
    pub width_percent: f32,
    pub height_percent: f32,
}

impl ControlEdit {
    /// Trims the text fields and validates the result.
    pub fn new(
        label: &str,
        key_name: &str,
        x_percent: f32,
        y_percent: f32,
        width_percent: f32,
        height_percent: f32,
    ) -> Result<Self, EditRejected> {
        let edit = Self {
            label: label.trim().to_string(),
            key_name: key_name.trim().to_string(),
            x_percent,
            y_percent,
            width_percent,
            height_percent,
        };
        edit.validate()?;
        Ok(edit)
    }

    pub fn validate(&self) -> Result<(), EditRejected> {
        if self.label.trim().is_empty() || self.key_name.trim().is_empty() {
            return Err(EditRejected::MissingText);
        }
        let position = 0.0..=1.0;
        let size = |v: f32| v > 0.0 && v <= 1.0;
        if !position.contains(&self.x_percent)
            || !position.contains(&self.y_percent)
            || !size(self.width_percent)
            || !size(self.height_percent)
        {
            return Err(EditRejected::OutOfRange);
        }
        Ok(())
    }

    /// Overwrites every field except the control's identity.
    pub fn apply(&self, config: &mut ButtonConfig) {
        config.label = self.label.trim().to_string();
        config.key_name = self.key_name.trim().to_string();
        config.set_position_percent(self.x_percent, self.y_percent);
        config.set_size_percent(self.width_percent, self.height_percent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_text_and_accepts_boundaries() {
        let edit = ControlEdit::new(" Jump ", " SPACE ", 0.0, 1.0, 1.0, 0.01).expect("valid");
        assert_eq!(edit.label, "Jump");
        assert_eq!(edit.key_name, "SPACE");
    }

    #[test]
    fn rejects_blank_text_and_out_of_range_geometry() {
        assert_eq!(
            ControlEdit::new("  ", "A", 0.1, 0.1, 0.1, 0.1),
            Err(EditRejected::MissingText)
        );
        assert_eq!(
            ControlEdit::new("A", "", 0.1, 0.1, 0.1, 0.1),
            Err(EditRejected::MissingText)
        );
        for (x, y, w, h) in [
            (-0.1, 0.1, 0.1, 0.1),
            (0.1, 1.5, 0.1, 0.1),
            (0.1, 0.1, 0.0, 0.1),
            (0.1, 0.1, 0.1, 1.01),
            (f32::NAN, 0.1, 0.1, 0.1),
        ] {
            assert_eq!(
                ControlEdit::new("A", "A", x, y, w, h),
                Err(EditRejected::OutOfRange),
                "{x} {y} {w} {h}"
            );
        }
    }

    #[test]
    fn apply_keeps_identity() {
        let mut config = ButtonConfig::new("A", "SPACE", 0.4, 0.4, 0.1, 0.1);
        let id = config.id;
        ControlEdit::new("Fire", "F", 0.2, 0.3, 0.15, 0.05)
            .expect("valid")
            .apply(&mut config);
        assert_eq!(config.id, id);
        assert_eq!(config.label, "Fire");
        assert_eq!(config.key_name, "F");
        assert_eq!(
            (config.x_percent, config.y_percent, config.width_percent, config.height_percent),
            (0.2, 0.3, 0.15, 0.05)
        );
    }
}
