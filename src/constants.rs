//! Element ids and labels shared by the overlay surfaces.

pub const OVERLAY_HEADER_ID: &str = "incremental-link-header";
pub const OVERLAY_TITLE_ID: &str = "linkCollectorTitle";
pub const OVERLAY_COUNT_ID: &str = "linkCount";
pub const OVERLAY_LIST_ID: &str = "incremental-link-list";
pub const CLEAR_BUTTON_ID: &str = "clearBtn";
pub const TOGGLE_BUTTON_ID: &str = "toggleBtn";

pub const TOGGLE_LABEL_OPEN: &str = "Open";
pub const TOGGLE_LABEL_CLOSE: &str = "Close";
pub const TOGGLE_LABEL_EXPAND: &str = "Expand";

/// Inline handler attribute treated as an ajax hint.
pub const ONCLICK_ATTRIBUTE: &str = "onclick";
pub const MARGIN_RIGHT: &str = "margin-right";
pub const DEFAULT_MARGIN: &str = "0px";
