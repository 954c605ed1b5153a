pub mod controller;
pub mod live_session;
pub mod pcm;
pub mod playback;
pub mod timer;
pub mod transcript;
