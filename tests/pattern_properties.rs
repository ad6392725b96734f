use dash::pattern::{Index, LocalIndex, Pattern};
use dash::view::IndexView;
use dash::{
    BlockPattern, CsrPattern, DistSpec, Distribution, ShiftTilePattern, TilePattern, TEAM_ALL,
};
use rand::{Rng, SeedableRng};

fn check_pattern<P: Pattern<N>, const N: usize>(pattern: &P) {
    let size = pattern.size();
    let nunits = pattern.num_units();

    // partition closure
    let total: usize = (0..nunits).map(|u| pattern.local_size(u)).sum();
    assert_eq!(total, size, "{:?}", pattern);

    for g in 0..size as Index {
        let l = pattern.local(g);
        assert!(l.unit < nunits);
        assert!((l.index as usize) < pattern.local_size(l.unit), "{:?} {:?}", pattern, l);
        assert_eq!(pattern.global_index(l.unit, l.index), g);
        let block = pattern.block_at(pattern.coords(g));
        assert!(pattern.block(block).contains(&pattern.coords(g)));
        assert_eq!(pattern.block_owner(block), l.unit);
    }

    for u in 0..nunits {
        for li in 0..pattern.local_size(u) as Index {
            let g = pattern.global_index(u, li);
            assert_eq!(pattern.local(g), LocalIndex { unit: u, index: li });
        }
        let bound = pattern.clone().bind(TEAM_ALL, u);
        let n = bound.local_size(u);
        if n > 0 {
            assert_eq!(bound.lbegin(), bound.global(0));
            assert_eq!(bound.lend(), bound.global(n as Index - 1) + 1);
        } else {
            assert_eq!((bound.lbegin(), bound.lend()), (0, 0));
        }
        let view = IndexView::new(&bound);
        assert_eq!(view.local().size(), n);
        let local_blocks: usize = view.blocks().local().iter().map(|b| b.size()).sum();
        assert_eq!(local_blocks, n);
    }

    for d in 0..N {
        let under = pattern.underfilled_blocksize(d);
        assert!(under < pattern.blocksize(d));
        assert_eq!(under == 0, pattern.extent(d) % pattern.blocksize(d) == 0);
    }

    // block coverage
    let view = IndexView::new(pattern);
    let blocks = view.blocks();
    assert_eq!(blocks.len(), pattern.blockspec().iter().product::<usize>());
    let mut covered: Vec<Index> = blocks.iter().flat_map(|b| b.index().to_vec()).collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..size as Index).collect::<Vec<_>>());
}

/// Random sub-views: cropping with the full extent is the identity and every cropped view is
/// covered by its blocks.
fn check_views<P: Pattern<N>, const N: usize>(pattern: &P, seed: u64) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let view = IndexView::new(pattern);
    assert_eq!(view.sub::<0>(0, pattern.extent(0)).index(), view.index());
    for _ in 0..16 {
        let ext = pattern.extent(0);
        let lo = rng.gen_range(0..=ext);
        let hi = rng.gen_range(lo..=ext);
        let sub = view.sub::<0>(lo, hi);
        assert_eq!(sub.domain().index(), view.index());
        assert_eq!(sub.size(), (hi - lo) * pattern.size() / ext.max(1));
        let from_blocks: usize = sub.blocks().iter().map(|b| b.size()).sum();
        assert_eq!(from_blocks, sub.size());
        let runs = sub.index().contiguous_runs();
        assert_eq!(runs.iter().map(|(_, n)| n).sum::<usize>(), sub.size());
    }
}

macro_rules! pattern_tests {
    ($name:ident, $units:expr, $make:expr) => {
        paste::paste! {
            #[test]
            #[allow(non_snake_case)]
            fn [<$name _ $units _units>]() {
                let pattern = ($make)($units);
                check_pattern(&pattern);
                check_views(&pattern, $units as u64);
            }
        }
    };
}

macro_rules! iter_units {
    ($name:ident, ($($units:expr),*), $make:expr) => {
        $(
            pattern_tests!($name, $units, $make);
        )*
    };
}

iter_units!(blocked, (1, 3, 4, 7), |n| BlockPattern::<1>::with_units(
    [41],
    DistSpec::new([Distribution::Blocked]),
    n
)
.unwrap());

iter_units!(cyclic, (1, 2, 5), |n| BlockPattern::<1>::with_units(
    [23],
    DistSpec::new([Distribution::Cyclic]),
    n
)
.unwrap());

iter_units!(block_cyclic, (2, 3), |n| BlockPattern::<1>::with_units(
    [29],
    DistSpec::new([Distribution::BlockCyclic(4)]),
    n
)
.unwrap());

iter_units!(blocked_2d, (1, 4, 6), |n| BlockPattern::<2>::with_units(
    [9, 13],
    DistSpec::new([Distribution::Blocked, Distribution::BlockCyclic(2)]),
    n
)
.unwrap());

iter_units!(tile_2d, (1, 2, 4), |n| TilePattern::<2>::with_units(
    [12, 8],
    DistSpec::tiled(2),
    n
)
.unwrap());

iter_units!(shift_tile_2d, (1, 2, 4), |n| ShiftTilePattern::<2>::with_units(
    [8, 16],
    DistSpec::tiled(2),
    n
)
.unwrap());

iter_units!(csr, (3, 4), |n: usize| CsrPattern::new(
    (0..n).map(|u| (u * 7 + 3) % 5).collect()
)
.unwrap());
