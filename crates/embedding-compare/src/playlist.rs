//! M3U export of the entities both panels agree on.

use std::collections::HashSet;

use crate::client::ApiRequest;
use crate::model::EntityId;

pub const PLAYLIST_FILE_NAME: &str = "playlist.m3u";

/// Ids present in both lists, in `left` order, without repeats
pub fn intersect(left: &[EntityId], right: &[EntityId]) -> Vec<EntityId> {
    let right: HashSet<&EntityId> = right.iter().collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|id| right.contains(id) && seen.insert(*id))
        .cloned()
        .collect()
}

/// `None` when the panels share nothing
pub fn playlist_request(left: &[EntityId], right: &[EntityId]) -> Option<ApiRequest> {
    let entities = intersect(left, right);
    if entities.is_empty() {
        tracing::info!(left = left.len(), right = right.len(), "panels share no entities, no playlist");
        return None;
    }
    tracing::info!(entities = entities.len(), "requesting playlist");
    Some(ApiRequest::Playlist { entities })
}

#[cfg(not(target_arch = "wasm32"))]
pub fn save_playlist(body: &str, path: &std::path::Path) -> crate::Result<()> {
    std::fs::write(path, body).map_err(|e| crate::Error::Storage(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "playlist written");
    Ok(())
}

/// Offer the playlist as a file download
#[cfg(target_arch = "wasm32")]
pub fn save_playlist(body: &str, file_name: &str) -> crate::Result<()> {
    use wasm_bindgen::JsCast;

    let js = |e: wasm_bindgen::JsValue| crate::Error::Storage(format!("{e:?}"));
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| crate::Error::Storage("no document".into()))?;

    let parts = js_sys::Array::of1(&wasm_bindgen::JsValue::from_str(body));
    let options = web_sys::BlobPropertyBag::new();
    options.set_type("audio/mpegurl");
    let blob = web_sys::Blob::new_with_str_sequence_and_options(&parts, &options).map_err(js)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob).map_err(js)?;

    let anchor = document
        .create_element("a")
        .map_err(js)?
        .dyn_into::<web_sys::HtmlAnchorElement>()
        .map_err(|_| crate::Error::Storage("created element is not <a>".into()))?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor.click();
    web_sys::Url::revoke_object_url(&url).map_err(js)?;
    tracing::info!(file_name, "playlist download offered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<EntityId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn intersection_keeps_left_order() {
        let left = ids(&["segment/3/5", "segment/3/1", "segment/3/9", "segment/3/1"]);
        let right = ids(&["segment/3/9", "segment/3/1", "segment/3/2"]);
        assert_eq!(intersect(&left, &right), ids(&["segment/3/1", "segment/3/9"]));
    }

    #[test]
    fn disjoint_panels_produce_no_request() {
        assert_eq!(playlist_request(&ids(&["a"]), &ids(&["b"])), None);
        assert_eq!(playlist_request(&[], &ids(&["b"])), None);
    }

    #[test]
    fn shared_entities_become_playlist_request() {
        let request = playlist_request(&ids(&["a", "b"]), &ids(&["b", "a"]));
        assert_eq!(request, Some(ApiRequest::Playlist { entities: ids(&["a", "b"]) }));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn playlist_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLAYLIST_FILE_NAME);
        save_playlist("http://a/1.mp3\nhttp://a/2.mp3", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "http://a/1.mp3\nhttp://a/2.mp3");
    }
}
