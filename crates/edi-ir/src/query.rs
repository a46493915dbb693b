//! Query and mutation operations on the node tree
//!
//! Every operation starts at `self`: the first criteria of an mpath is
//! matched against the node the call is made on, later criteria against its
//! descendants, depth first.

use crate::mpath::{display_path, Criteria, Lookup, Selector, TYPE_MARKER};
use crate::node::{FieldValue, Node, Queries, Record};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Sort key fallback for children lacking the compare value.
const SORT_IF_ABSENT: &str = "AAAAAAAAAAA";

/// Options for [`Node::sort`]
#[derive(Debug, Clone)]
pub struct SortOptions {
    /// Sort descending
    pub reverse: bool,

    /// Compare keys as decimal numbers instead of text
    pub numeric: bool,

    /// Key used when the compare value is absent
    pub if_absent: String,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            reverse: false,
            numeric: false,
            if_absent: SORT_IF_ABSENT.to_string(),
        }
    }
}

/// Verifies an mpath against the record structure of a grammar.
pub trait MpathCheck {
    /// Fail when a step names a record or field unknown at that level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Grammar`] describing the first mismatch.
    fn check_mpath(&self, mpath: &[Criteria]) -> Result<()>;
}

impl Node {
    fn matches(&self, criteria: &Criteria) -> bool {
        if self.id() != Some(criteria.id.as_str()) || self.occurrence != criteria.occurrence {
            return false;
        }
        criteria.fields.iter().all(|(key, selector)| match selector {
            Selector::Value(v) => self.text(key) == Some(v.as_str()),
            Selector::Unbound => self.record.contains_key(key),
        })
    }

    fn find_first(&self, mpath: &[Criteria]) -> Option<&Node> {
        let (first, rest) = mpath.split_first()?;
        if !self.matches(first) {
            return None;
        }
        if rest.is_empty() {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_first(rest))
    }

    /// Value requested by the unbound selector in the last step.
    ///
    /// Returns `None` when nothing matches. When the last step has no
    /// unbound selector the type marker of the matched record is returned,
    /// so the result doubles as an existence test.
    ///
    /// # Errors
    ///
    /// Fails when an unbound selector appears before the last step or the
    /// last step has more than one.
    pub fn get_field(&self, mpath: &[Criteria]) -> Result<Option<&FieldValue>> {
        check_lookup(mpath)?;
        let key = mpath
            .last()
            .and_then(Criteria::unbound_field)
            .unwrap_or(TYPE_MARKER);
        let found = self.find_first(mpath).and_then(|node| node.record.get(key));
        trace!(mpath = %display_path(mpath), found = found.is_some(), "get");
        Ok(found)
    }

    /// Like [`Node::get_field`], for scalar values.
    ///
    /// # Errors
    ///
    /// See [`Node::get_field`].
    pub fn get(&self, mpath: &[Criteria]) -> Result<Option<String>> {
        Ok(self
            .get_field(mpath)?
            .and_then(FieldValue::as_text)
            .map(str::to_string))
    }

    /// True when a node matches the full mpath.
    ///
    /// # Errors
    ///
    /// See [`Node::get_field`].
    pub fn exists(&self, mpath: &[Criteria]) -> Result<bool> {
        Ok(self.get_field(mpath)?.is_some())
    }

    /// Whole record of the first node matching the mpath.
    ///
    /// # Errors
    ///
    /// Fails on an empty mpath or any unbound selector.
    pub fn get_record(&self, mpath: &[Criteria]) -> Result<Option<&Record>> {
        check_bound(mpath)?;
        Ok(self.find_first(mpath).map(|node| &node.record))
    }

    /// First node matching the mpath.
    ///
    /// # Errors
    ///
    /// Fails on an empty mpath or any unbound selector.
    pub fn get_node(&self, mpath: &[Criteria]) -> Result<Option<&Node>> {
        check_bound(mpath)?;
        Ok(self.find_first(mpath))
    }

    /// Lazily iterate all nodes matching the mpath, depth first.
    ///
    /// # Errors
    ///
    /// Fails on an empty mpath or any unbound selector.
    pub fn get_loop<'a>(&'a self, mpath: &'a [Criteria]) -> Result<Loop<'a>> {
        check_bound(mpath)?;
        Ok(Loop {
            mpath,
            stack: vec![(self, 0)],
        })
    }

    /// Like [`Node::get_loop`], also returning the matched ancestors
    /// (one per earlier step) of every match.
    ///
    /// # Errors
    ///
    /// Fails on an empty mpath or any unbound selector.
    pub fn get_loop_with_path<'a>(
        &'a self,
        mpath: &[Criteria],
    ) -> Result<Vec<(Vec<&'a Node>, &'a Node)>> {
        check_bound(mpath)?;
        let mut found = Vec::new();
        let mut ancestors = Vec::new();
        self.collect_with_path(mpath, &mut ancestors, &mut found);
        Ok(found)
    }

    fn collect_with_path<'a>(
        &'a self,
        mpath: &[Criteria],
        ancestors: &mut Vec<&'a Node>,
        found: &mut Vec<(Vec<&'a Node>, &'a Node)>,
    ) {
        let Some((first, rest)) = mpath.split_first() else {
            return;
        };
        if !self.matches(first) {
            return;
        }
        if rest.is_empty() {
            found.push((ancestors.clone(), self));
            return;
        }
        ancestors.push(self);
        for child in &self.children {
            child.collect_with_path(rest, ancestors, found);
        }
        ancestors.pop();
    }

    /// Number of nodes matching the mpath.
    ///
    /// # Errors
    ///
    /// See [`Node::get_loop`].
    pub fn count_occurrences(&self, mpath: &[Criteria]) -> Result<usize> {
        Ok(self.get_loop(mpath)?.count())
    }

    /// Evaluate a lookup against this node.
    ///
    /// # Errors
    ///
    /// Fails when a path in the lookup is malformed.
    pub fn enhanced_get(&self, lookup: &Lookup) -> Result<Option<String>> {
        match lookup {
            Lookup::Literal(value) => Ok(Some(value.clone())),
            Lookup::Path(mpath) => self.get(mpath),
            Lookup::Concat(paths) => {
                let mut joined = String::new();
                for mpath in paths {
                    if let Some(part) = self.get(mpath)? {
                        joined.push_str(part.trim());
                    }
                }
                Ok(Some(joined))
            }
        }
    }

    /// Evaluate named lookups and merge the non-empty results into the
    /// node's queries.
    ///
    /// # Errors
    ///
    /// Fails when a lookup is malformed.
    pub fn gather_queries(&mut self, lookups: &BTreeMap<String, Lookup>) -> Result<()> {
        let mut found = Queries::new();
        for (key, lookup) in lookups {
            if let Some(value) = self.enhanced_get(lookup)? {
                let value = value.trim();
                if !value.is_empty() {
                    found.insert(key.clone(), value.to_string());
                }
            }
        }
        self.update_queries(&found);
        Ok(())
    }

    /// Add the mpath to the tree, reusing nodes whose records agree with
    /// each step and creating the rest.
    ///
    /// Returns `Ok(false)` without touching the tree when any step carries an
    /// unbound (absent) value. Values are trimmed.
    ///
    /// # Errors
    ///
    /// Fails on an empty mpath, or when the first step conflicts with the
    /// record of `self`.
    pub fn put(&mut self, mpath: &[Criteria]) -> Result<bool> {
        self.put_with(mpath, true)
    }

    /// Like [`Node::put`] but keeps leading and trailing spaces, for
    /// fixed-layout header records.
    ///
    /// # Errors
    ///
    /// See [`Node::put`].
    pub fn put_unstripped(&mut self, mpath: &[Criteria]) -> Result<bool> {
        self.put_with(mpath, false)
    }

    fn put_with(&mut self, mpath: &[Criteria], strip: bool) -> Result<bool> {
        let Some(steps) = prepare_put(mpath, strip)? else {
            return Ok(false);
        };
        let (first, rest) = steps.split_at(1);
        if !self.same_occurrence(&first[0]) {
            return Err(Error::put_root(display_path(mpath)));
        }
        self.put_core(rest);
        debug!(mpath = %display_path(mpath), "put");
        Ok(true)
    }

    fn put_core(&mut self, steps: &[Criteria]) {
        let Some((first, rest)) = steps.split_first() else {
            return;
        };
        let existing = self
            .children
            .iter_mut()
            .position(|child| child.same_occurrence(first));
        let child = match existing {
            Some(index) => &mut self.children[index],
            None => self.append(node_for(first)),
        };
        child.put_core(rest);
    }

    /// Like [`Node::put`], but the last step always creates a new child.
    /// Returns the node of the last step, or `None` when the call was a no-op.
    ///
    /// # Errors
    ///
    /// See [`Node::put`].
    pub fn put_loop(&mut self, mpath: &[Criteria]) -> Result<Option<&mut Node>> {
        let Some(steps) = prepare_put(mpath, true)? else {
            return Ok(None);
        };
        if !self.same_occurrence(&steps[0]) {
            return Err(Error::put_root(display_path(mpath)));
        }
        match steps[1..].split_first() {
            None => Ok(Some(self)),
            Some((next, rest)) => Ok(Some(self.put_loop_core(next, rest))),
        }
    }

    fn put_loop_core(&mut self, step: &Criteria, rest: &[Criteria]) -> &mut Node {
        let Some((next, tail)) = rest.split_first() else {
            return self.append(node_for(step));
        };
        let existing = self
            .children
            .iter_mut()
            .position(|child| child.same_occurrence(step));
        let child = match existing {
            Some(index) => &mut self.children[index],
            None => self.append(node_for(step)),
        };
        child.put_loop_core(next, tail)
    }

    /// True when every field present in both the record and the criteria
    /// agrees; on success the criteria's new fields are merged in.
    fn same_occurrence(&mut self, criteria: &Criteria) -> bool {
        if self.has_record() {
            if self.id() != Some(criteria.id.as_str()) || self.occurrence != criteria.occurrence
            {
                return false;
            }
            let conflict = criteria.fields.iter().any(|(key, selector)| {
                matches!(selector, Selector::Value(v)
                    if self.record.get(key).is_some_and(|existing| existing.as_text() != Some(v.as_str())))
            });
            if conflict {
                return false;
            }
        }
        merge(self, criteria);
        true
    }

    /// Apply `updates` to the first node matching `location`: `Some` sets a
    /// (trimmed) value, `None` removes the field. The type marker and the
    /// occurrence index are never changed.
    ///
    /// # Errors
    ///
    /// Fails on an empty location or any unbound selector in it.
    pub fn change(
        &mut self,
        location: &[Criteria],
        updates: &BTreeMap<String, Option<String>>,
    ) -> Result<bool> {
        check_bound(location)?;
        let changed = self.change_core(location, updates);
        debug!(mpath = %display_path(location), changed, "change");
        Ok(changed)
    }

    fn change_core(
        &mut self,
        location: &[Criteria],
        updates: &BTreeMap<String, Option<String>>,
    ) -> bool {
        let Some((first, rest)) = location.split_first() else {
            return false;
        };
        if !self.matches(first) {
            return false;
        }
        if rest.is_empty() {
            for (key, value) in updates {
                if key == TYPE_MARKER || key == crate::mpath::OCCURRENCE_KEY {
                    continue;
                }
                match value {
                    Some(v) => {
                        self.record
                            .insert(key.clone(), FieldValue::Text(v.trim().to_string()));
                    }
                    None => {
                        self.record.remove(key);
                    }
                }
            }
            return true;
        }
        self.children
            .iter_mut()
            .any(|child| child.change_core(rest, updates))
    }

    /// Remove the first node matching the full mpath from its parent.
    ///
    /// # Errors
    ///
    /// Fails when the mpath has fewer than two steps or carries unbound
    /// selectors.
    pub fn delete(&mut self, mpath: &[Criteria]) -> Result<bool> {
        check_bound(mpath)?;
        if mpath.len() < 2 {
            return Err(Error::mpath_format(
                display_path(mpath),
                "delete needs at least two steps",
            ));
        }
        let deleted = self.delete_core(mpath);
        debug!(mpath = %display_path(mpath), deleted, "delete");
        Ok(deleted)
    }

    fn delete_core(&mut self, mpath: &[Criteria]) -> bool {
        if !self.matches(&mpath[0]) {
            return false;
        }
        if mpath.len() == 2 {
            if let Some(index) = self.children.iter().position(|c| c.matches(&mpath[1])) {
                self.children.remove(index);
                return true;
            }
            return false;
        }
        self.children
            .iter_mut()
            .any(|child| child.delete_core(&mpath[1..]))
    }

    /// Reorder the children of every node matching `sort_from`, keyed by
    /// the value `compare` yields for each child.
    ///
    /// # Errors
    ///
    /// Fails when `sort_from` is malformed, or when the last step of
    /// `compare` does not carry exactly one unbound selector.
    pub fn sort(
        &mut self,
        sort_from: &[Criteria],
        compare: &[Criteria],
        options: &SortOptions,
    ) -> Result<()> {
        check_bound(sort_from)?;
        check_lookup(compare)?;
        if compare.last().map_or(0, Criteria::unbound_count) != 1 {
            return Err(Error::mpath_format(
                display_path(compare),
                "last step must have exactly one unbound selector",
            ));
        }
        self.for_each_match_mut(sort_from, &mut |node| sort_children(node, compare, options));
        Ok(())
    }

    fn for_each_match_mut(&mut self, mpath: &[Criteria], f: &mut dyn FnMut(&mut Node)) {
        let Some((first, rest)) = mpath.split_first() else {
            return;
        };
        if !self.matches(first) {
            return;
        }
        if rest.is_empty() {
            f(self);
            return;
        }
        for child in &mut self.children {
            child.for_each_match_mut(rest, f);
        }
    }

    /// Grammar-checked view on this node.
    pub fn checked<'a>(&'a mut self, grammar: &'a dyn MpathCheck) -> CheckedNode<'a> {
        CheckedNode { node: self, grammar }
    }
}

#[derive(Debug, PartialEq, PartialOrd)]
enum SortKey {
    Text(String),
    Number(f64),
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
        }
    }
}

fn sort_children(node: &mut Node, compare: &[Criteria], options: &SortOptions) {
    let key_field = compare.last().and_then(Criteria::unbound_field).unwrap_or(TYPE_MARKER);
    let fallback_number = options.if_absent.trim().parse::<f64>().unwrap_or(0.0);
    let mut keyed: Vec<(SortKey, Node)> = std::mem::take(&mut node.children)
        .into_iter()
        .map(|child| {
            let value = child
                .find_first(compare)
                .and_then(|n| n.text(key_field))
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let key = if options.numeric {
                SortKey::Number(
                    value
                        .and_then(|v| v.trim().parse::<f64>().ok())
                        .unwrap_or(fallback_number),
                )
            } else {
                SortKey::Text(value.unwrap_or_else(|| options.if_absent.clone()))
            };
            (key, child)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = a.compare(b);
        if options.reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
    node.children = keyed.into_iter().map(|(_, child)| child).collect();
}

fn node_for(criteria: &Criteria) -> Node {
    let mut node = Node::root();
    merge(&mut node, criteria);
    node
}

fn merge(node: &mut Node, criteria: &Criteria) {
    node.record.insert(
        TYPE_MARKER.to_string(),
        FieldValue::Text(criteria.id.clone()),
    );
    node.occurrence.clone_from(&criteria.occurrence);
    for (key, selector) in &criteria.fields {
        if let Selector::Value(v) = selector {
            node.record.insert(key.clone(), FieldValue::Text(v.clone()));
        }
    }
}

fn prepare_put(mpath: &[Criteria], strip: bool) -> Result<Option<Vec<Criteria>>> {
    if mpath.is_empty() {
        return Err(Error::mpath_format("", "empty mpath"));
    }
    if mpath.iter().any(|c| c.unbound_count() > 0) {
        debug!(mpath = %display_path(mpath), "absent value in put; nothing added");
        return Ok(None);
    }
    Ok(Some(if strip {
        mpath.iter().map(Criteria::stripped).collect()
    } else {
        mpath.to_vec()
    }))
}

fn check_bound(mpath: &[Criteria]) -> Result<()> {
    if mpath.is_empty() {
        return Err(Error::mpath_format("", "empty mpath"));
    }
    if mpath.iter().any(|c| c.unbound_count() > 0) {
        return Err(Error::mpath_format(
            display_path(mpath),
            "unbound selector not allowed here",
        ));
    }
    Ok(())
}

fn check_lookup(mpath: &[Criteria]) -> Result<()> {
    let Some((last, leading)) = mpath.split_last() else {
        return Err(Error::mpath_format("", "empty mpath"));
    };
    if leading.iter().any(|c| c.unbound_count() > 0) {
        return Err(Error::mpath_format(
            display_path(mpath),
            "unbound selector only allowed in the last step",
        ));
    }
    if last.unbound_count() > 1 {
        return Err(Error::mpath_format(
            display_path(mpath),
            "more than one unbound selector in the last step",
        ));
    }
    Ok(())
}

/// Lazy depth-first iterator over nodes matching an mpath.
///
/// Finite; iterate again by calling [`Node::get_loop`] again.
pub struct Loop<'a> {
    mpath: &'a [Criteria],
    stack: Vec<(&'a Node, usize)>,
}

impl<'a> Iterator for Loop<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<&'a Node> {
        while let Some((node, depth)) = self.stack.pop() {
            if !node.matches(&self.mpath[depth]) {
                continue;
            }
            if depth + 1 == self.mpath.len() {
                return Some(node);
            }
            self.stack
                .extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }
        None
    }
}

/// Node operations that verify every mpath against a grammar first.
pub struct CheckedNode<'a> {
    node: &'a mut Node,
    grammar: &'a dyn MpathCheck,
}

impl CheckedNode<'_> {
    /// Checked [`Node::get`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch or malformed mpath.
    pub fn get(&self, mpath: &[Criteria]) -> Result<Option<String>> {
        self.grammar.check_mpath(mpath)?;
        self.node.get(mpath)
    }

    /// Checked [`Node::get_record`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch or malformed mpath.
    pub fn get_record(&self, mpath: &[Criteria]) -> Result<Option<&Record>> {
        self.grammar.check_mpath(mpath)?;
        self.node.get_record(mpath)
    }

    /// Checked [`Node::get_loop`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch or malformed mpath.
    pub fn get_loop<'b>(&'b self, mpath: &'b [Criteria]) -> Result<Loop<'b>> {
        self.grammar.check_mpath(mpath)?;
        self.node.get_loop(mpath)
    }

    /// Checked [`Node::put`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch, malformed mpath or root conflict.
    pub fn put(&mut self, mpath: &[Criteria]) -> Result<bool> {
        self.grammar.check_mpath(mpath)?;
        self.node.put(mpath)
    }

    /// Checked [`Node::put_loop`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch, malformed mpath or root conflict.
    pub fn put_loop(&mut self, mpath: &[Criteria]) -> Result<Option<&mut Node>> {
        self.grammar.check_mpath(mpath)?;
        self.node.put_loop(mpath)
    }

    /// Checked [`Node::change`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch or malformed mpath.
    pub fn change(
        &mut self,
        location: &[Criteria],
        updates: &BTreeMap<String, Option<String>>,
    ) -> Result<bool> {
        self.grammar.check_mpath(location)?;
        self.node.change(location, updates)
    }

    /// Checked [`Node::delete`].
    ///
    /// # Errors
    ///
    /// Grammar mismatch or malformed mpath.
    pub fn delete(&mut self, mpath: &[Criteria]) -> Result<bool> {
        self.grammar.check_mpath(mpath)?;
        self.node.delete(mpath)
    }

    /// Checked [`Node::sort`]; `sort_from` and `compare` are checked as one
    /// continuous path.
    ///
    /// # Errors
    ///
    /// Grammar mismatch or malformed mpath.
    pub fn sort(
        &mut self,
        sort_from: &[Criteria],
        compare: &[Criteria],
        options: &SortOptions,
    ) -> Result<()> {
        let full: Vec<Criteria> = sort_from.iter().chain(compare).cloned().collect();
        self.grammar.check_mpath(&full)?;
        self.node.sort(sort_from, compare, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpath::Mpath;

    fn path(text: &str) -> Mpath {
        text.parse().unwrap()
    }

    fn sample() -> Node {
        let mut unh = Node::new("UNH").with_field("0062", "M1");
        unh.append(Node::new("BGM").with_field("1004", "PO-1"));
        unh.append(Node::new("LIN").with_field("1082", "1").with_field("7140", "B"))
            .append(Node::new("QTY").with_field("6060", "10"));
        unh.append(Node::new("LIN").with_field("1082", "2").with_field("7140", "A"))
            .append(Node::new("QTY").with_field("6060", "20"));
        unh
    }

    #[test]
    fn get_returns_first_depth_first_match() {
        let unh = sample();
        assert_eq!(
            unh.get(&path("UNH/LIN/QTY[6060=?]")).unwrap(),
            Some("10".to_string())
        );
        assert_eq!(
            unh.get(&path("UNH/LIN[1082=2]/QTY[6060=?]")).unwrap(),
            Some("20".to_string())
        );
    }

    #[test]
    fn get_returns_none_without_match() {
        let unh = sample();
        assert_eq!(unh.get(&path("UNH/DTM[2380=?]")).unwrap(), None);
        assert_eq!(unh.get(&path("UNH/BGM[1225=?]")).unwrap(), None);
        assert_eq!(unh.get(&path("UNB/BGM[1004=?]")).unwrap(), None);
    }

    #[test]
    fn get_rejects_two_unbound_selectors() {
        let unh = sample();
        let err = unh.get(&path("UNH/LIN[1082=?,7140=?]")).unwrap_err();
        assert!(matches!(err, Error::MpathFormat { .. }));

        let err = unh.get(&path("UNH[0062=?]/LIN[1082=?]")).unwrap_err();
        assert!(matches!(err, Error::MpathFormat { .. }));
    }

    #[test]
    fn get_without_unbound_tests_existence() {
        let unh = sample();
        assert_eq!(unh.get(&path("UNH/BGM")).unwrap(), Some("BGM".to_string()));
        assert!(unh.exists(&path("UNH/LIN[7140=A]")).unwrap());
        assert!(!unh.exists(&path("UNH/LIN[7140=C]")).unwrap());
    }

    #[test]
    fn get_respects_occurrence_index() {
        let mut root = Node::new("ROOT");
        root.append(Node::new("NAD").with_field("3035", "BY"));
        root.append(Node::new("NAD").with_occurrence("2").with_field("3035", "SU"));

        assert_eq!(
            root.get(&path("ROOT/NAD#2[3035=?]")).unwrap(),
            Some("SU".to_string())
        );
        assert_eq!(
            root.get(&path("ROOT/NAD[3035=?]")).unwrap(),
            Some("BY".to_string())
        );
    }

    #[test]
    fn get_loop_yields_all_matches_lazily() {
        let unh = sample();
        let mpath = path("UNH/LIN");
        let values: Vec<_> = unh
            .get_loop(&mpath)
            .unwrap()
            .map(|n| n.text("1082").unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["1", "2"]);

        let mut again = unh.get_loop(&mpath).unwrap();
        assert_eq!(again.next().and_then(|n| n.text("1082")), Some("1"));
        assert_eq!(unh.count_occurrences(&path("UNH/LIN/QTY")).unwrap(), 2);
    }

    #[test]
    fn get_loop_single_step_matches_self() {
        let unh = sample();
        assert_eq!(unh.count_occurrences(&path("UNH")).unwrap(), 1);
        assert_eq!(unh.count_occurrences(&path("UNB")).unwrap(), 0);
    }

    #[test]
    fn get_loop_with_path_returns_ancestors() {
        let mut root = Node::new("UNB").with_field("0020", "IC1");
        root.append(sample());
        let found = root.get_loop_with_path(&path("UNB/UNH/LIN")).unwrap();
        assert_eq!(found.len(), 2);
        let (ancestors, node) = &found[1];
        assert_eq!(ancestors.len(), 2);
        assert_eq!(ancestors[0].text("0020"), Some("IC1"));
        assert_eq!(node.text("1082"), Some("2"));
    }

    #[test]
    fn get_record_returns_whole_record() {
        let unh = sample();
        let record = unh.get_record(&path("UNH/LIN[1082=2]")).unwrap().unwrap();
        assert_eq!(record["7140"], FieldValue::Text("A".into()));
        assert!(unh.get_record(&path("UNH/LIN[1082=?]")).is_err());
    }

    #[test]
    fn put_merges_shared_leading_criteria() {
        let mut root = Node::root();
        assert!(root.put(&path("UNH[0062=M1]/BGM[1004=PO-1]")).unwrap());
        assert!(root.put(&path("UNH[0062=M1]/BGM[1225=9]")).unwrap());
        assert!(root.put(&path("UNH[0062=M1]/DTM[2380= 20240101 ]")).unwrap());

        assert_eq!(root.id(), Some("UNH"));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].text("1004"), Some("PO-1"));
        assert_eq!(root.children[0].text("1225"), Some("9"));
        assert_eq!(root.children[1].text("2380"), Some("20240101"));
    }

    #[test]
    fn put_creates_sibling_on_conflicting_value() {
        let mut root = Node::root();
        root.put(&path("UNH/NAD[3035=BY]")).unwrap();
        root.put(&path("UNH/NAD[3035=SU]")).unwrap();
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn put_with_absent_value_is_noop() {
        let mut root = Node::root();
        assert!(!root.put(&path("UNH/BGM[1004=?]")).unwrap());
        assert!(!root.has_record());
        assert!(root.children.is_empty());
    }

    #[test]
    fn put_rejects_conflicting_root() {
        let mut root = Node::new("UNH");
        let err = root.put(&path("UNB/BGM[1004=X]")).unwrap_err();
        assert!(matches!(err, Error::PutRoot { .. }));
    }

    #[test]
    fn put_unstripped_keeps_spaces() {
        let mut root = Node::root();
        root.put_unstripped(&path("ISA[ISA02=          ]")).unwrap();
        assert_eq!(root.text("ISA02"), Some("          "));
    }

    #[test]
    fn put_loop_always_appends() {
        let mut root = Node::root();
        let mpath = path("UNH/LIN[1082=1]");
        root.put_loop(&mpath).unwrap().unwrap().set("7140", "X");
        root.put_loop(&mpath).unwrap().unwrap().set("7140", "Y");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].text("7140"), Some("Y"));

        let lin = root
            .put_loop(&path("UNH/LIN[1082=3]/QTY[6060=5]"))
            .unwrap()
            .unwrap();
        assert_eq!(lin.id(), Some("QTY"));
        assert_eq!(root.children.len(), 3);
    }

    #[test]
    fn put_loop_single_step_returns_self() {
        let mut root = Node::root();
        let node = root.put_loop(&path("UNH[0062=1]")).unwrap().unwrap();
        assert_eq!(node.text("0062"), Some("1"));
        assert!(root.children.is_empty());
    }

    #[test]
    fn change_updates_and_removes_fields() {
        let mut unh = sample();
        let mut updates = BTreeMap::new();
        updates.insert("7140".to_string(), None);
        updates.insert("1229".to_string(), Some(" 3 ".to_string()));
        updates.insert("BOTSID".to_string(), Some("XXX".to_string()));

        assert!(unh.change(&path("UNH/LIN[1082=2]"), &updates).unwrap());
        let lin = &unh.children[2];
        assert_eq!(lin.id(), Some("LIN"));
        assert_eq!(lin.text("7140"), None);
        assert_eq!(lin.text("1229"), Some("3"));

        assert!(!unh.change(&path("UNH/LIN[1082=9]"), &updates).unwrap());
    }

    #[test]
    fn delete_removes_matched_node() {
        let mut unh = sample();
        assert!(unh.delete(&path("UNH/LIN[1082=1]")).unwrap());
        assert_eq!(unh.children.len(), 2);
        assert_eq!(unh.children[1].text("1082"), Some("2"));
        assert!(!unh.delete(&path("UNH/LIN[1082=1]")).unwrap());
        assert!(unh.delete(&path("UNH")).is_err());
    }

    #[test]
    fn sort_reorders_children() {
        let mut unh = sample();
        unh.sort(&path("UNH"), &path("LIN[7140=?]"), &SortOptions::default())
            .unwrap();
        let order: Vec<_> = unh.children.iter().map(|n| n.text("7140")).collect();
        assert_eq!(order, vec![Some("A"), None, Some("B")]);

        let options = SortOptions {
            if_absent: "0".to_string(),
            ..SortOptions::default()
        };
        unh.sort(&path("UNH"), &path("LIN[7140=?]"), &options).unwrap();
        assert_eq!(unh.children[0].id(), Some("BGM"));
    }

    #[test]
    fn sort_numeric_reverse_on_nested_value() {
        let mut unh = sample();
        let options = SortOptions {
            reverse: true,
            numeric: true,
            ..SortOptions::default()
        };
        unh.sort(&path("UNH"), &path("LIN/QTY[6060=?]"), &options)
            .unwrap();
        let order: Vec<_> = unh.children.iter().map(|n| n.text("1082")).collect();
        assert_eq!(order, vec![Some("2"), Some("1"), None]);
    }

    #[test]
    fn sort_requires_one_unbound_selector() {
        let mut unh = sample();
        let err = unh
            .sort(&path("UNH"), &path("LIN"), &SortOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::MpathFormat { .. }));
    }

    #[test]
    fn enhanced_get_variants() {
        let unh = sample();
        assert_eq!(
            unh.enhanced_get(&Lookup::Literal("ORDERS".into())).unwrap(),
            Some("ORDERS".to_string())
        );
        assert_eq!(
            unh.enhanced_get(&Lookup::Path(path("UNH[0062=?]"))).unwrap(),
            Some("M1".to_string())
        );
        let concat = Lookup::Concat(vec![
            path("UNH[0062=?]"),
            path("UNH/XXX[1=?]"),
            path("UNH/BGM[1004=?]"),
        ]);
        assert_eq!(unh.enhanced_get(&concat).unwrap(), Some("M1PO-1".to_string()));
    }

    #[test]
    fn gather_queries_skips_empty_results() {
        let mut unh = sample();
        let mut lookups = BTreeMap::new();
        lookups.insert("reference".to_string(), Lookup::Path(path("UNH[0062=?]")));
        lookups.insert("missing".to_string(), Lookup::Path(path("UNH/DTM[2380=?]")));
        unh.gather_queries(&lookups).unwrap();
        assert_eq!(unh.queries().get("reference"), Some(&"M1".to_string()));
        assert!(!unh.queries().contains_key("missing"));
    }

    struct OnlyUnh;

    impl MpathCheck for OnlyUnh {
        fn check_mpath(&self, mpath: &[Criteria]) -> Result<()> {
            if mpath.iter().all(|c| c.id == "UNH" || c.id == "LIN") {
                Ok(())
            } else {
                Err(Error::grammar(display_path(mpath), "unknown record"))
            }
        }
    }

    #[test]
    fn checked_operations_fail_fast() {
        let mut unh = sample();
        let mut checked = unh.checked(&OnlyUnh);
        assert!(checked.get(&path("UNH/LIN[1082=?]")).is_ok());
        assert!(matches!(
            checked.put(&path("UNH/BGM[1004=X]")),
            Err(Error::Grammar { .. })
        ));
        assert!(checked.sort(&path("UNH"), &path("LIN[7140=?]"), &SortOptions::default()).is_ok());
    }
}
