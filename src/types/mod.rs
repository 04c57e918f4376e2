pub mod canvas;
pub mod lastfm;
