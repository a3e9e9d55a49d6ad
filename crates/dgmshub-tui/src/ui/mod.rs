//! Terminal UI module using ratatui.
//!
//! This module provides the TUI rendering and input handling:
//!
//! - `render`: Main frame rendering, the tile grid and overlays
//! - `input`: Keyboard event handling
//! - `styles`: Color schemes and tile styling

pub mod input;
pub mod render;
pub mod styles;
