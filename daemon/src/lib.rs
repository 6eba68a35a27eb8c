pub mod arrangement;
pub mod attach;
pub mod daemon;
pub mod display;
pub mod events;
pub mod player;
pub mod properties;
pub mod screensaver;
pub mod settings;
pub mod socket;
pub mod supervisor;
pub mod wallpaper;
pub mod winsys;
