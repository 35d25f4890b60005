//! Discord rendering: embeds, button rows and the now-playing message.

pub mod buttons;
pub mod embeds;
pub mod surface;
