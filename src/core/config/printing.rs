use crate::core::config::data::{path_display, Config};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  backend-url: {}", self.backend_url());
        match self.idle_timeout() {
            Some(timeout) => println!("  stream-idle-timeout: {}s", timeout.as_secs()),
            None => println!("  stream-idle-timeout: off"),
        }
        println!("  max-follow-ups: {}", self.max_follow_ups());
        match &self.session_file {
            Some(path) => println!("  session-file: {}", path_display(path)),
            None => println!("  session-file: (default)"),
        }
        match &self.transcript_log {
            Some(path) => println!("  transcript-log: {path}"),
            None => println!("  transcript-log: (unset)"),
        }
    }
}
