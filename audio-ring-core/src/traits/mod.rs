pub mod audio_capture;
pub mod capture_backend;
pub mod capture_delegate;
pub mod capture_host;
pub mod keep_alive;
