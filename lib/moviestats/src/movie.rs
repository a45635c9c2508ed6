//! Record model and the two positional CSV layouts it is parsed from.

use crate::csv::{split_fields, split_fields_any};
use crate::errors::{ConfigError, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const IMDB_COLUMNS: usize = 9;
pub const MOVIELENS_COLUMNS: usize = 3;

/// Column layout of the input files. Chosen by the job, never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Schema {
    /// `imdbID,Title,Year,Runtime,Genre,Released,imdbRating,imdbVotes,Country`
    Imdb,
    /// `movieId,title,genres` with the year embedded in the title as `(YYYY)`.
    MovieLens,
}

impl Schema {
    pub fn header_prefix(self) -> &'static str {
        match self {
            Schema::Imdb => "imdbID,",
            Schema::MovieLens => "movieId,",
        }
    }

    pub fn is_header(self, line: &str) -> bool {
        let prefix = self.header_prefix();
        line.starts_with(prefix) || line == prefix.trim_end_matches(',')
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Schema::Imdb => "imdb",
            Schema::MovieLens => "movielens",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Schema {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "imdb" | "a" => Ok(Schema::Imdb),
            "movielens" | "b" => Ok(Schema::MovieLens),
            _ => Err(ConfigError::UnknownVariant { kind: "schema", value: s.to_string(), expected: "imdb, movielens" }),
        }
    }
}

/// How the genre column is turned into a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenrePolicy {
    /// Drop every quote, split on `,`, trim, drop empties, keep duplicates.
    CommaTrimmed,
    /// Split on `|` and keep each entry untrimmed. Empty entries are dropped.
    PipeVerbatim,
}

impl GenrePolicy {
    pub fn parse(self, raw: &str) -> Vec<String> {
        match self {
            GenrePolicy::CommaTrimmed => raw
                .replace('"', "")
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect(),
            GenrePolicy::PipeVerbatim => raw
                .split('|')
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// One parsed data row. Built per line, used to pick keys, then dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Option<u64>,
    pub title: String,
    /// Four digits, `"0"` when the MovieLens title has no year suffix, or the
    /// raw Year column for IMDb rows.
    pub year: String,
    pub runtime: String,
    pub genres: Vec<String>,
    pub released: String,
    pub rating: String,
    pub votes: String,
    pub country: String,
}

pub fn parse_line(schema: Schema, line: &str) -> Result<Movie, ParseError> {
    match schema {
        Schema::Imdb => parse_imdb(line),
        Schema::MovieLens => parse_movielens(line),
    }
}

pub fn parse_imdb(line: &str) -> Result<Movie, ParseError> {
    let f = split_fields(line, IMDB_COLUMNS)?;
    Ok(Movie {
        id: parse_id(f[0]),
        title: f[1].to_string(),
        year: f[2].to_string(),
        runtime: f[3].to_string(),
        genres: GenrePolicy::CommaTrimmed.parse(f[4]),
        released: f[5].to_string(),
        rating: f[6].to_string(),
        votes: f[7].to_string(),
        country: f[8].to_string(),
    })
}

pub fn parse_movielens(line: &str) -> Result<Movie, ParseError> {
    let f = split_fields_any(line);
    if f.len() < MOVIELENS_COLUMNS {
        return Err(ParseError::SchemaMismatch { needed: MOVIELENS_COLUMNS, found: f.len() });
    }
    let raw_title = f[1].replace('"', "");
    let year = match year_suffix(&raw_title) {
        Ok(y) => y,
        Err(e) => { debug!(title = %raw_title, error = %e, "no year suffix, using 0"); 0 }
    };
    let title = raw_title.replace(&format!(" ({})", year), "");
    Ok(Movie {
        id: parse_id(f[0]),
        title,
        year: year.to_string(),
        genres: GenrePolicy::PipeVerbatim.parse(f[2]),
        ..Movie::default()
    })
}

/// Read the four characters just before the last one, i.e. `YYYY` in a
/// trailing `(YYYY)`.
pub fn year_suffix(title: &str) -> Result<u16, ParseError> {
    let chars: Vec<char> = title.chars().collect();
    let malformed = || ParseError::MalformedNumeric { field: "year", value: title.to_string() };
    if chars.len() < 5 {
        return Err(malformed());
    }
    let digits = &chars[chars.len() - 5..chars.len() - 1];
    if !digits.iter().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.iter().collect::<String>().parse().map_err(|_| malformed())
}

fn parse_id(raw: &str) -> Option<u64> {
    match raw.trim().parse() {
        Ok(id) => Some(id),
        Err(_) => {
            debug!(error = %ParseError::MalformedNumeric { field: "id", value: raw.to_string() }, "keeping record without id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movielens_year_is_cut_from_title() {
        let m = parse_movielens(r#"1,Toy Story (1995),Adventure|Animation|Children"#).unwrap();
        assert_eq!(m.id, Some(1));
        assert_eq!(m.title, "Toy Story");
        assert_eq!(m.year, "1995");
        assert_eq!(m.genres, vec!["Adventure", "Animation", "Children"]);
    }

    #[test]
    fn movielens_quoted_title_with_comma() {
        let m = parse_movielens(r#"11,"American President, The (1995)",Comedy|Drama|Romance"#).unwrap();
        assert_eq!(m.title, "American President, The");
        assert_eq!(m.year, "1995");
    }

    #[test]
    fn title_without_year_falls_back_to_zero() {
        let m = parse_movielens("7,Untitled,Drama").unwrap();
        assert_eq!(m.year, "0");
        assert_eq!(m.title, "Untitled");
        assert!(year_suffix("Short").is_err());
        assert!(year_suffix("(95)").is_err());
    }

    #[test]
    fn movielens_genres_are_not_trimmed() {
        let m = parse_movielens("3,Heat (1995),Action| Crime||Thriller").unwrap();
        assert_eq!(m.genres, vec!["Action", " Crime", "Thriller"]);
    }

    #[test]
    fn movielens_short_line_is_a_schema_mismatch() {
        let err = parse_movielens("42,Lonely Title (2001)").unwrap_err();
        assert_eq!(err, ParseError::SchemaMismatch { needed: 3, found: 2 });
    }

    #[test]
    fn imdb_row_parses_all_columns() {
        let line = r#"5,"Heat",1995,170 min,"Action, Crime, , Drama, Action",15 Dec 1995,8.3,"600,000",USA"#;
        let m = parse_imdb(line).unwrap();
        assert_eq!(m.id, Some(5));
        assert_eq!(m.title, "Heat");
        assert_eq!(m.year, "1995");
        assert_eq!(m.runtime, "170 min");
        assert_eq!(m.genres, vec!["Action", "Crime", "Drama", "Action"]);
        assert_eq!(m.released, "15 Dec 1995");
        assert_eq!(m.rating, "8.3");
        assert_eq!(m.votes, "600,000");
        assert_eq!(m.country, "USA");
    }

    #[test]
    fn imdb_non_numeric_id_is_kept_as_none() {
        let m = parse_imdb("tt0113277,Heat,1995,170 min,Action,15 Dec 1995,8.3,600000,USA").unwrap();
        assert_eq!(m.id, None);
        assert_eq!(m.title, "Heat");
    }

    #[test]
    fn header_detection() {
        assert!(Schema::Imdb.is_header("imdbID,Title,Year"));
        assert!(Schema::Imdb.is_header("imdbID"));
        assert!(!Schema::Imdb.is_header("movieId,title,genres"));
        assert!(Schema::MovieLens.is_header("movieId,title,genres"));
    }
}
