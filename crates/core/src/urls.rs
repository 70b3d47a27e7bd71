use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::Url;

pub fn lastfm_track_url(artist: &str, track: &str) -> String {
    let artist = utf8_percent_encode(artist, NON_ALPHANUMERIC).to_string();
    let track = utf8_percent_encode(track, NON_ALPHANUMERIC).to_string();
    format!("https://www.last.fm/music/{artist}/_/{track}")
}

pub fn musicbrainz_search_url(artist: &str, track: &str) -> String {
    let query = format!("artist:\"{artist}\" AND recording:\"{track}\"");
    match Url::parse_with_params(
        "https://musicbrainz.org/search",
        &[("query", query.as_str()), ("type", "recording")],
    ) {
        Ok(url) => url.to_string(),
        Err(_) => "https://musicbrainz.org/search".to_string(),
    }
}
