// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use method_flow::{Label, ProbeId};

use crate::instruction::InsnId;

/// One element of a method body in emission order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MethodAtom {
    Label(Label),
    Insn(InsnId),
    Probe(ProbeId),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AtomKind {
    Label,
    Insn,
    Probe,
}

impl MethodAtom {
    pub fn kind(&self) -> AtomKind {
        match self {
            Self::Label(_) => AtomKind::Label,
            Self::Insn(_) => AtomKind::Insn,
            Self::Probe(_) => AtomKind::Probe,
        }
    }
}

/// Emission-order list of labels, instructions and probes.
///
/// Positions are signed so that callers can probe before the first atom;
/// every lookup outside the list yields `None`.
#[derive(Clone, Debug, Default)]
pub struct Atoms {
    atoms: Vec<MethodAtom>,
    labels: HashMap<Label, usize>,
}

impl Atoms {
    pub fn push(&mut self, atom: MethodAtom) {
        if let MethodAtom::Label(label) = atom {
            // A label is placed at most once; keep the first position.
            self.labels.entry(label).or_insert(self.atoms.len());
        }

        self.atoms.push(atom);
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn get(&self, pos: isize) -> Option<MethodAtom> {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| self.atoms.get(pos))
            .copied()
    }

    /// Position of a placed label.
    pub fn position(&self, label: Label) -> Option<isize> {
        self.labels
            .get(&label)
            .and_then(|pos| isize::try_from(*pos).ok())
    }

    pub fn contains(&self, pos: isize) -> bool {
        self.get(pos).is_some()
    }

    pub fn kind(&self, pos: isize) -> Option<AtomKind> {
        self.get(pos).map(|atom| atom.kind())
    }

    pub fn insn(&self, pos: isize) -> Option<InsnId> {
        match self.get(pos)? {
            MethodAtom::Insn(id) => Some(id),
            _ => None,
        }
    }

    pub fn label(&self, pos: isize) -> Option<Label> {
        match self.get(pos)? {
            MethodAtom::Label(label) => Some(label),
            _ => None,
        }
    }

    pub fn probe(&self, pos: isize) -> Option<ProbeId> {
        match self.get(pos)? {
            MethodAtom::Probe(probe) => Some(probe),
            _ => None,
        }
    }

    pub fn is_insn(&self, pos: isize) -> bool {
        self.insn(pos).is_some()
    }

    pub fn is_probe(&self, pos: isize) -> bool {
        self.probe(pos).is_some()
    }

    /// Positions within `from..=to` that lie inside the list.
    pub fn window(&self, from: isize, to: isize) -> RangeInclusive<isize> {
        let last = isize::try_from(self.atoms.len()).unwrap_or(isize::MAX) - 1;
        from.max(0)..=to.min(last)
    }

    /// Kind shared by the atoms at every position, or `None` if the kinds
    /// differ or any position is outside the list.
    pub fn common_kind(&self, positions: &[isize]) -> Option<AtomKind> {
        let (first, rest) = positions.split_first()?;
        let kind = self.kind(*first)?;

        for pos in rest {
            if self.kind(*pos)? != kind {
                return None;
            }
        }

        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn atoms() -> Atoms {
        let mut atoms = Atoms::default();
        atoms.push(MethodAtom::Label(Label(0)));
        atoms.push(MethodAtom::Insn(InsnId(0)));
        atoms.push(MethodAtom::Probe(ProbeId(0)));
        atoms.push(MethodAtom::Label(Label(1)));
        atoms.push(MethodAtom::Insn(InsnId(1)));
        atoms
    }

    #[test]
    fn test_lookups_are_bounds_checked() {
        let atoms = atoms();

        assert_eq!(atoms.get(-1), None);
        assert_eq!(atoms.get(5), None);
        assert_eq!(atoms.insn(1), Some(InsnId(0)));
        assert_eq!(atoms.insn(2), None);
        assert_eq!(atoms.probe(2), Some(ProbeId(0)));
        assert_eq!(atoms.label(3), Some(Label(1)));
        assert_eq!(atoms.position(Label(1)), Some(3));
        assert_eq!(atoms.position(Label(7)), None);
    }

    #[test]
    fn test_window_is_clamped() {
        let atoms = atoms();

        assert_eq!(atoms.window(-3, 2), 0..=2);
        assert_eq!(atoms.window(2, isize::MAX), 2..=4);
        assert_eq!(atoms.window(isize::MIN, isize::MAX), 0..=4);
        assert!(atoms.window(isize::MAX, isize::MAX).is_empty());
        assert!(Atoms::default().window(0, 3).is_empty());
    }

    #[test]
    fn test_common_kind() {
        let atoms = atoms();

        assert_eq!(atoms.common_kind(&[1, 4]), Some(AtomKind::Insn));
        assert_eq!(atoms.common_kind(&[0, 3]), Some(AtomKind::Label));
        assert_eq!(atoms.common_kind(&[1, 2]), None);
        assert_eq!(atoms.common_kind(&[1, 9]), None);
        assert_eq!(atoms.common_kind(&[]), None);
    }
}
