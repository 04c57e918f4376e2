pub mod lastfm;

pub use lastfm::LastfmClient;
