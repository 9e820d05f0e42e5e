mod github;
mod google;

pub use github::GitHubProvider;
pub use google::GoogleProvider;
