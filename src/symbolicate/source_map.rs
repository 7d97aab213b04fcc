//! Source map lookups for symbolication.
//!
//! Decoding is done by the `sourcemap` crate. Indexed maps are flattened on
//! load so lookups only ever see one regular map.

use sourcemap::DecodedMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("invalid source map: {0}")]
    Decode(#[from] sourcemap::Error),
}

/// Where a generated position came from. `line` is 1-based, `column` 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition<'a> {
    pub source: &'a str,
    pub line: u32,
    pub column: u32,
    pub name: Option<&'a str>,
    /// Embedded original content, if the map carries it
    pub content: Option<&'a str>,
}

#[derive(Debug)]
pub struct SourceMap {
    inner: sourcemap::SourceMap,
}

impl SourceMap {
    pub fn from_slice(data: &[u8]) -> Result<Self, SourceMapError> {
        let inner = match sourcemap::decode_slice(data)? {
            DecodedMap::Regular(map) => map,
            DecodedMap::Index(index) => index.flatten()?,
            DecodedMap::Hermes(hermes) => (*hermes).clone(),
        };
        Ok(Self { inner })
    }

    /// Original position of generated `line` (1-based) and `column` (0-based).
    ///
    /// Uses the closest mapping at or before `column` on that same line.
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalPosition<'_>> {
        let line = line.checked_sub(1)?;
        let token = self.inner.lookup_token(line, column)?;
        if token.get_dst_line() != line {
            return None;
        }

        Some(OriginalPosition {
            source: token.get_source()?,
            line: token.get_src_line() + 1,
            column: token.get_src_col(),
            name: token.get_name(),
            content: self.inner.get_source_contents(token.get_src_id()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> SourceMap {
        // line 1: col 0 → a.js 1:0, col 4 → a.js 1:4 name "foo"
        // line 2: col 2 → b.js 30:6
        let json = r#"{
            "version": 3,
            "sources": ["a.js", "b.js"],
            "sourcesContent": ["let foo = 1;", null],
            "names": ["foo"],
            "mappings": "AAAA,IAAIA;EC4BE"
        }"#;
        SourceMap::from_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_lookup() {
        let map = map();

        let pos = map.lookup(1, 6).unwrap();
        assert_eq!((pos.source, pos.line, pos.column, pos.name), ("a.js", 1, 4, Some("foo")));
        assert_eq!(pos.content, Some("let foo = 1;"));

        let pos = map.lookup(1, 0).unwrap();
        assert_eq!((pos.line, pos.column, pos.name), (1, 0, None));

        let pos = map.lookup(2, 30).unwrap();
        assert_eq!((pos.source, pos.line, pos.column), ("b.js", 29, 6));
        assert_eq!(pos.content, None);
    }

    #[test]
    fn test_lookup_stays_on_line() {
        let map = map();
        assert!(map.lookup(0, 0).is_none());
        assert!(map.lookup(2, 1).is_none());
        assert!(map.lookup(9, 0).is_none());
    }

    #[test]
    fn test_indexed_map_is_flattened() {
        let json = r#"{
            "version": 3,
            "sections": [
                {
                    "offset": {"line": 0, "column": 0},
                    "map": {"version": 3, "sources": ["a.js"], "names": [], "mappings": "AAAA"}
                },
                {
                    "offset": {"line": 1, "column": 0},
                    "map": {"version": 3, "sources": ["b.js"], "names": [], "mappings": "AACA"}
                }
            ]
        }"#;
        let map = SourceMap::from_slice(json.as_bytes()).unwrap();

        let pos = map.lookup(1, 0).unwrap();
        assert_eq!((pos.source, pos.line), ("a.js", 1));
        let pos = map.lookup(2, 0).unwrap();
        assert_eq!((pos.source, pos.line), ("b.js", 2));
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(SourceMap::from_slice(b"not json").is_err());
    }
}
