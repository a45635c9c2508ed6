//! In-memory map/reduce over a slice of lines, for small inputs and tests.
//! Output order is unspecified.

use crate::api::{Mapper, Reducer};
use rayon::prelude::*;
use std::collections::HashMap;

const CHUNK_LINES: usize = 1024;

pub fn map_reduce_lines<M, R, S>(mapper: &M, reducer: &R, lines: &[S]) -> Vec<R::Out>
where
    M: Mapper<Input = String> + Sync,
    R: Reducer<Key = M::Key, ValueIn = M::Value> + Sync,
    S: AsRef<str> + Sync,
{
    let groups: HashMap<M::Key, Vec<M::Value>> = lines
        .par_chunks(CHUNK_LINES)
        .map(|chunk| {
            let mut local: HashMap<M::Key, Vec<M::Value>> = HashMap::new();
            mapper.do_map(chunk.iter().map(|l| l.as_ref().to_string()), &mut |k, v| local.entry(k).or_default().push(v));
            local
        })
        .reduce(HashMap::new, |mut acc, part| {
            for (k, mut vs) in part {
                acc.entry(k).or_default().append(&mut vs);
            }
            acc
        });

    groups
        .into_par_iter()
        .flat_map_iter(|(k, vs)| {
            let mut out = Vec::new();
            reducer.do_reduce(&k, vs, &mut |o| out.push(o));
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobPreset;
    use crate::jobs::{CountReducer, KeyCount, MovieMapper};
    use proptest::prelude::*;

    fn sorted(mut v: Vec<KeyCount>) -> Vec<KeyCount> {
        v.sort();
        v
    }

    #[test]
    fn years_are_counted() {
        let mapper = MovieMapper::new(JobPreset::MovielensYears.config());
        let lines = ["movieId,title,genres", "1,Toy Story (1995),Animation", "2,Jumanji (1995),Adventure", "3,Heat (1995),Action", "4,Se7en (1996),Crime", "5,broken"];
        let out = sorted(map_reduce_lines(&mapper, &CountReducer::new(0), &lines));
        assert_eq!(out, vec![KeyCount { key: "1995".into(), count: 3 }, KeyCount { key: "1996".into(), count: 1 }]);
        assert_eq!(mapper.counters().snapshot().skipped, 1);
    }

    proptest! {
        #[test]
        fn counts_do_not_depend_on_line_order(
            years in prop::collection::vec(1990u16..1996, 1..300),
            seed in any::<u64>(),
        ) {
            let lines: Vec<String> = years.iter().enumerate().map(|(i, y)| format!("{},Film {} ({}),Drama", i, i, y)).collect();
            let mut shuffled = lines.clone();
            // deterministic Fisher-Yates driven by the generated seed
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state ^= state << 13; state ^= state >> 7; state ^= state << 17;
                shuffled.swap(i, (state % (i as u64 + 1)) as usize);
            }
            let mapper = MovieMapper::new(JobPreset::MovielensYears.config());
            let reducer = CountReducer::new(0);
            let a = sorted(map_reduce_lines(&mapper, &reducer, &lines));
            let b = sorted(map_reduce_lines(&mapper, &reducer, &shuffled));
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.iter().map(|kc| kc.count).sum::<u64>(), years.len() as u64);
        }
    }
}
