//! Exercises the arena's compaction/relocation contract at the public API
//! (spec.md §7 "All arena references must be patched during compaction");
//! the per-module unit tests check the mechanism in isolation, these check
//! it end to end across many constraints the way a real clean-up would.

use qute::qbf::formula::constraint::ConstraintAllocator;
use qute::qbf::formula::Var;

fn unit_clause(v: usize, sign: bool) -> Vec<qute::qbf::Lit> {
    vec![Var(v).lit(sign)]
}

#[test]
fn compacting_a_mixed_live_and_freed_arena_preserves_every_surviving_literal() {
    let mut live = ConstraintAllocator::new(false);

    // Interleave constraints we will keep with ones we will free, so the
    // live set is not a contiguous prefix of the arena.
    let mut refs = Vec::new();
    for i in 0..12 {
        let lits = if i % 2 == 0 {
            vec![Var(i).lit(false), Var(i + 1).lit(true)]
        } else {
            unit_clause(i, false)
        };
        refs.push((i, live.alloc(&lits, false), lits));
    }

    for &(i, r, _) in &refs {
        if i % 3 == 0 {
            live.free(r);
        }
    }

    let mut compacted = ConstraintAllocator::new(false);
    let mut relocated = Vec::new();
    for &(i, r, ref lits) in &refs {
        if i % 3 != 0 {
            let new_r = live.reloc(r, &mut compacted);
            relocated.push((new_r, lits.clone()));
        }
    }
    live.move_to(&mut compacted);

    for (new_r, expected) in relocated {
        let got: Vec<_> = live.view(new_r).lits().collect();
        assert_eq!(got, expected, "surviving constraint's literals must be unchanged after compaction");
    }
}

#[test]
fn relocating_the_same_reference_twice_forwards_instead_of_copying_again() {
    let mut from = ConstraintAllocator::new(false);
    let mut to_a = ConstraintAllocator::new(false);
    let mut to_b = ConstraintAllocator::new(false);

    let expected = vec![Var(0).lit(false), Var(1).lit(true)];
    let r = from.alloc(&expected, false);
    let first = from.reloc(r, &mut to_a);
    assert_eq!(to_a.view(first).lits().collect::<Vec<_>>(), expected);

    // A second reloc call (even against a different destination arena) must
    // read the forwarding pointer left by the first, not copy again: it
    // returns the same reference and leaves `to_b` untouched.
    let second = from.reloc(r, &mut to_b);
    assert_eq!(first, second);
    assert_eq!(to_b.garbage_fraction(), 0.0);
}

#[test]
fn a_learnt_constraint_keeps_its_lbd_and_activity_across_compaction() {
    let mut from = ConstraintAllocator::new(false);
    let mut to = ConstraintAllocator::new(false);

    let r = from.alloc(&[Var(0).lit(false), Var(1).lit(false), Var(2).lit(true)], true);
    from.edit(r).set_lbd(2);
    from.edit(r).set_activity(7.25);

    let new_r = from.reloc(r, &mut to);
    assert_eq!(to.view(new_r).lbd(), 2);
    assert_eq!(to.view(new_r).activity(), 7.25);
}

#[test]
fn garbage_fraction_drops_after_a_free_is_compacted_away() {
    let mut live = ConstraintAllocator::new(false);
    let keep = live.alloc(&[Var(0).lit(false), Var(1).lit(false)], false);
    let drop = live.alloc(&[Var(2).lit(false), Var(3).lit(true)], false);
    live.free(drop);
    assert!(live.garbage_fraction() > 0.0);

    let mut compacted = ConstraintAllocator::new(false);
    let new_keep = live.reloc(keep, &mut compacted);
    live.move_to(&mut compacted);
    assert_eq!(live.garbage_fraction(), 0.0);
    assert_eq!(live.view(new_keep).lits().collect::<Vec<_>>(), vec![Var(0).lit(false), Var(1).lit(false)]);
}
