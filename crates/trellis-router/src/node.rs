//! Segment trie.
//!
//! Each node owns one path segment. Matching tries static children first,
//! then the parameter child, then the wildcard child, backtracking when a
//! branch dead-ends deeper in the path.

use crate::methods::MethodSet;
use crate::params::Params;
use crate::pattern::Segment;

#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    statics: Vec<(String, Node)>,
    param: Option<(String, Box<Node>)>,
    wildcard: Option<(String, MethodSet)>,
    methods: MethodSet,
}

impl Node {
    /// Returns the method set at the end of `segments`, creating nodes as needed.
    ///
    /// A parameter slot keeps the name it was first registered with; later
    /// patterns that use a different name at the same position share the
    /// node and capture under the first name.
    pub(crate) fn endpoint_mut(&mut self, segments: &[Segment]) -> &mut MethodSet {
        let Some((first, rest)) = segments.split_first() else {
            return &mut self.methods;
        };

        match first {
            Segment::Static(text) => {
                let idx = match self.statics.iter().position(|(s, _)| s == text) {
                    Some(idx) => idx,
                    None => {
                        self.statics.push((text.clone(), Node::default()));
                        self.statics.len() - 1
                    }
                };
                self.statics[idx].1.endpoint_mut(rest)
            }
            Segment::Param(name) => {
                let (_, child) = self
                    .param
                    .get_or_insert_with(|| (name.clone(), Box::default()));
                child.endpoint_mut(rest)
            }
            Segment::Wildcard(name) => {
                let (_, methods) = self
                    .wildcard
                    .get_or_insert_with(|| (name.clone(), MethodSet::new()));
                methods
            }
        }
    }

    /// Finds the method set serving `segments`, recording captures in `params`.
    pub(crate) fn find<'a>(&'a self, segments: &[&str], params: &mut Params) -> Option<&'a MethodSet> {
        let Some((first, rest)) = segments.split_first() else {
            if !self.methods.is_empty() {
                return Some(&self.methods);
            }
            return None;
        };

        if let Some((_, child)) = self.statics.iter().find(|(s, _)| s == first) {
            if let Some(found) = child.find(rest, params) {
                return Some(found);
            }
        }

        if let Some((name, child)) = &self.param {
            let mark = params.len();
            params.push(name.clone(), *first);
            if let Some(found) = child.find(rest, params) {
                return Some(found);
            }
            params.truncate(mark);
        }

        if let Some((name, methods)) = &self.wildcard {
            params.push(name.clone(), segments.join("/"));
            return Some(methods);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse;
    use http::Method;

    fn insert(root: &mut Node, pattern: &str, id: &str) {
        let segments = parse(pattern).unwrap();
        root.endpoint_mut(&segments)
            .insert(Some(Method::GET), id)
            .unwrap();
    }

    fn find(root: &Node, path: &str) -> Option<(String, Params)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        root.find(&segments, &mut params)
            .and_then(|m| m.lookup(&Method::GET))
            .map(|id| (id.to_string(), params))
    }

    #[test]
    fn test_static_beats_param() {
        let mut root = Node::default();
        insert(&mut root, "/users/:id", "one");
        insert(&mut root, "/users/me", "me");

        assert_eq!(find(&root, "/users/me").unwrap().0, "me");
        assert_eq!(find(&root, "/users/7").unwrap().0, "one");
    }

    #[test]
    fn test_backtracks_from_static_branch() {
        let mut root = Node::default();
        insert(&mut root, "/users/me/settings", "settings");
        insert(&mut root, "/users/:id/posts", "posts");

        let (id, params) = find(&root, "/users/me/posts").unwrap();
        assert_eq!(id, "posts");
        assert_eq!(params.get("id"), Some("me"));
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let mut root = Node::default();
        insert(&mut root, "/files/*path", "files");

        let (_, params) = find(&root, "/files/a/b/c.txt").unwrap();
        assert_eq!(params.get("path"), Some("a/b/c.txt"));
    }

    #[test]
    fn test_root_route() {
        let mut root = Node::default();
        insert(&mut root, "/", "index");
        assert_eq!(find(&root, "/").unwrap().0, "index");
        assert!(find(&root, "/missing").is_none());
    }
}
