//! Substring search over a byte stream that arrives in pieces

/// Finds a marker in a stream of chunks, including one that straddles a
/// chunk boundary. Only `marker.len() - 1` bytes of history are kept.
#[derive(Debug, Clone)]
pub struct MarkerSearch {
    marker: Vec<u8>,
    tail: Vec<u8>,
    found: bool,
}

impl MarkerSearch {
    pub fn new(marker: impl Into<Vec<u8>>) -> Self {
        let marker = marker.into();
        MarkerSearch {
            found: marker.is_empty(),
            marker,
            tail: Vec::new(),
        }
    }

    /// Feed the next chunk; true once the marker has been seen
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.found {
            return true;
        }

        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(chunk);

        if contains(&window, &self.marker) {
            self.found = true;
            return true;
        }

        let keep = (self.marker.len() - 1).min(window.len());
        self.tail = window.split_off(window.len() - keep);
        false
    }

    pub fn found(&self) -> bool {
        self.found
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}
