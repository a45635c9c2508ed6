use moviestats::{CountReducer, ExecutablePipeline, JobPreset, MovieMapper, RuntimeConfig, RuntimePipeline};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const IMDB_HEADER: &str = "imdbID,Title,Year,Runtime,Genre,Released,imdbRating,imdbVotes,Country";

fn imdb_line(id: usize, title: &str, year: u16, genre: &str) -> String {
    format!("tt{:07},\"{}\",{},100 min,\"{}\",01 Jan {},7.0,1000,USA", id, title, year, genre, year)
}

fn test_config(work: &Path) -> RuntimeConfig {
    RuntimeConfig {
        local_tasks: 4,
        num_reducers: Some(3),
        work_dir: work.to_string_lossy().into_owned(),
        ..RuntimeConfig::default()
    }
}

fn run(preset: JobPreset, threshold: Option<u64>, input: &str, cfg: RuntimeConfig) -> anyhow::Result<(TempDir, Vec<(String, u64)>)> {
    let dir = tempfile::tempdir()?;
    let in_path = dir.path().join("input.csv");
    fs::write(&in_path, input)?;
    let out_path = dir.path().join("out");

    let mut job = preset.config();
    if let Some(t) = threshold {
        job = job.with_threshold(t);
    }
    let reducer = CountReducer::new(job.threshold);
    let mut pipeline = RuntimePipeline::with_config(cfg);
    pipeline.add_input(in_path.to_string_lossy());
    pipeline.add_output(out_path.to_string_lossy());
    pipeline.map_reduce(MovieMapper::new(job), reducer)?;
    let rows = read_output(&out_path);
    Ok((dir, rows))
}

fn read_output(out: &Path) -> Vec<(String, u64)> {
    let mut rows = Vec::new();
    for entry in fs::read_dir(out).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if !(name.starts_with("part-") && name.ends_with(".tsv")) {
            continue;
        }
        for line in fs::read_to_string(&path).unwrap().lines() {
            let (k, v) = line.split_once('\t').unwrap();
            rows.push((k.to_string(), v.parse().unwrap()));
        }
    }
    rows.sort();
    rows
}

#[test]
fn frequent_words_pass_the_default_threshold() {
    let work = tempfile::tempdir().unwrap();
    let mut input = String::from(IMDB_HEADER);
    input.push('\n');
    for i in 0..150 {
        input.push_str(&imdb_line(i, "The Amazing Journey", 2000, "Drama"));
        input.push('\n');
    }
    for i in 150..160 {
        input.push_str(&imdb_line(i, "Rare Words", 2001, "Drama"));
        input.push('\n');
    }
    let (_dir, rows) = run(JobPreset::WordsInMovies, None, &input, test_config(work.path())).unwrap();
    assert_eq!(rows, vec![("amazing".to_string(), 150), ("journey".to_string(), 150)]);
}

#[test]
fn threshold_equal_to_count_drops_the_key() {
    let work = tempfile::tempdir().unwrap();
    let input: String = (0..101).map(|i| imdb_line(i, "Spider-Man", 2002, "Action") + "\n").collect();

    let (_d, rows) = run(JobPreset::WordsInMovies, Some(101), &input, test_config(work.path())).unwrap();
    assert!(rows.is_empty());
    let (_d, rows) = run(JobPreset::WordsInMovies, Some(100), &input, test_config(work.path())).unwrap();
    assert_eq!(rows, vec![("spiderman".to_string(), 101)]);
}

#[test]
fn movies_per_year_skips_header_and_bad_lines() {
    let work = tempfile::tempdir().unwrap();
    let input = [
        IMDB_HEADER.to_string(),
        imdb_line(1, "Heat", 1995, "Action, Crime"),
        imdb_line(2, "Se7en", 1995, "Crime, Drama"),
        "tt0000003,Too Short,1996".to_string(),
        imdb_line(4, "Fargo", 1996, "Crime"),
        String::new(),
    ]
    .join("\r\n");
    let (dir, rows) = run(JobPreset::MoviesInYear, None, &input, test_config(work.path())).unwrap();
    assert_eq!(rows, vec![("1995".to_string(), 2), ("1996".to_string(), 1)]);

    let out = dir.path().join("out");
    assert!(out.join("_SUCCESS").exists());
    let stats: serde_json::Value = serde_json::from_str(&fs::read_to_string(out.join("_stats.json")).unwrap()).unwrap();
    assert_eq!(stats["reduce"]["records_out"], 2);
    assert_eq!(stats["map"]["total_emits"], 3);
}

#[test]
fn genres_are_trimmed_and_counted_per_movie() {
    let work = tempfile::tempdir().unwrap();
    let input = [
        imdb_line(1, "Heat", 1995, "Action, Crime"),
        imdb_line(2, "Se7en", 1995, "Crime, Drama"),
        imdb_line(3, "Fargo", 1996, "Crime"),
    ]
    .join("\n");
    let (_d, rows) = run(JobPreset::Genres, None, &input, test_config(work.path())).unwrap();
    assert_eq!(rows, vec![("Action".to_string(), 1), ("Crime".to_string(), 3), ("Drama".to_string(), 1)]);
}

#[test]
fn movielens_years_come_from_titles() {
    let work = tempfile::tempdir().unwrap();
    let input = "movieId,title,genres\n\
                 1,Toy Story (1995),Adventure|Animation|Children\n\
                 2,\"American President, The (1995)\",Comedy|Drama|Romance\n\
                 3,Heat (1995),Action|Crime|Thriller\n\
                 4,Se7en (1996),Mystery|Thriller\n\
                 5,No Year Here,Drama\n";
    let (_d, rows) = run(JobPreset::MovielensYears, None, input, test_config(work.path())).unwrap();
    assert_eq!(rows, vec![("0".to_string(), 1), ("1995".to_string(), 3), ("1996".to_string(), 1)]);
}

#[test]
fn many_splits_give_the_same_counts() {
    let work = tempfile::tempdir().unwrap();
    let input: String = (0..2000).map(|i| imdb_line(i, "Film", 1980 + (i % 7) as u16, "Drama") + "\n").collect();

    let single = RuntimeConfig { local_tasks: 1, num_reducers: Some(1), ..test_config(work.path()) };
    let (_d, a) = run(JobPreset::MoviesInYear, None, &input, single).unwrap();
    let split = RuntimeConfig { local_tasks: 16, num_reducers: Some(5), min_split_bytes: 1024, ..test_config(work.path()) };
    let (_d, b) = run(JobPreset::MoviesInYear, None, &input, split).unwrap();

    assert_eq!(a, b);
    assert_eq!(a.len(), 7);
    assert_eq!(a.iter().map(|(_, c)| c).sum::<u64>(), 2000);
}

#[test]
fn intermediates_are_removed_after_the_run() {
    let work = tempfile::tempdir().unwrap();
    let input = imdb_line(1, "Heat", 1995, "Action");
    run(JobPreset::MoviesInYear, None, &input, test_config(work.path())).unwrap();
    assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
}

#[test]
fn missing_input_is_an_error() {
    let work = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut pipeline = RuntimePipeline::with_config(test_config(work.path()));
    pipeline.add_input(work.path().join("nope.csv").to_string_lossy());
    pipeline.add_output(out.path().join("out").to_string_lossy());
    let job = JobPreset::MoviesInYear.config();
    assert!(pipeline.map_reduce(MovieMapper::new(job), CountReducer::new(0)).is_err());
}

#[test]
fn output_spelled_as_an_alias_of_the_input_is_refused() {
    let work = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let data = root.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::create_dir(root.path().join("x")).unwrap();
    let movies = data.join("movies.csv");
    fs::write(&movies, imdb_line(1, "Heat", 1995, "Action")).unwrap();

    let mut pipeline = RuntimePipeline::with_config(test_config(work.path()));
    pipeline.add_input(data.to_string_lossy());
    pipeline.add_output(root.path().join("x/../data").to_string_lossy());
    let job = JobPreset::MoviesInYear.config();
    assert!(pipeline.map_reduce(MovieMapper::new(job), CountReducer::new(0)).is_err());
    assert!(movies.exists());
}

#[test]
fn input_root_inside_the_output_is_refused_even_when_empty() {
    let work = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let out = root.path().join("out");
    fs::create_dir_all(out.join("empty")).unwrap();
    fs::write(out.join("keep.txt"), "previous run").unwrap();

    let mut pipeline = RuntimePipeline::with_config(test_config(work.path()));
    pipeline.add_input(out.join("empty").to_string_lossy());
    pipeline.add_output(out.to_string_lossy());
    let job = JobPreset::MoviesInYear.config();
    assert!(pipeline.map_reduce(MovieMapper::new(job), CountReducer::new(0)).is_err());
    assert!(out.join("keep.txt").exists());
}
