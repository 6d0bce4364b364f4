//! Reflection-taint tracking (spec §4.2 edge cases, Design Notes).
//!
//! A struct field or function parameter that reaches `reflect`-based code
//! (JSON/YAML marshaling, `reflect.ValueOf`, ORMs built on struct tags)
//! must keep its original name, or the reflective lookup breaks at
//! runtime. `ReflectedParamDb` tracks that taint starting from a seed set
//! of known reflection entry points and propagates it along call edges
//! until no new taint is discovered.

use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    /// Index of the caller's argument passed as the callee's parameter
    /// that reaches the reflective sink, used to taint only the matching
    /// parameter rather than every parameter of the caller.
    pub arg_index: usize,
}

/// Functions whose Nth argument is known, a priori, to be passed to
/// reflection (the standard library's marshal/unmarshal entry points).
/// Real driver code extends this from a package's own declared sinks.
pub fn default_seed_sinks() -> Vec<(&'static str, usize)> {
    vec![
        ("encoding/json.Marshal", 0),
        ("encoding/json.Unmarshal", 1),
        ("encoding/yaml.Marshal", 0),
        ("encoding/yaml.Unmarshal", 1),
        ("reflect.ValueOf", 0),
    ]
}

#[derive(Debug, Default)]
pub struct ReflectedParamDb {
    /// Tainted `(function, arg_index)` pairs discovered so far.
    tainted: HashSet<(String, usize)>,
}

impl ReflectedParamDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tainted(&self, function: &str, arg_index: usize) -> bool {
        self.tainted.contains(&(function.to_string(), arg_index))
    }

    /// Seeds the taint set directly from the well-known sinks, then
    /// propagates backwards through `edges` via worklist until a fixed
    /// point: if `callee`'s `arg_index`'th parameter is tainted and an edge
    /// feeds `caller`'s argument into it, the caller's corresponding
    /// argument becomes tainted too.
    pub fn compute(edges: &[CallEdge]) -> Self {
        let mut db = Self::new();
        for (sink, idx) in default_seed_sinks() {
            db.tainted.insert((sink.to_string(), idx));
        }

        let mut by_callee: HashMap<&str, Vec<&CallEdge>> = HashMap::new();
        for edge in edges {
            by_callee.entry(edge.callee.as_str()).or_default().push(edge);
        }

        let mut worklist: VecDeque<(String, usize)> = db.tainted.iter().cloned().collect();
        while let Some((callee, idx)) = worklist.pop_front() {
            if let Some(incoming) = by_callee.get(callee.as_str()) {
                for edge in incoming {
                    if edge.arg_index == idx {
                        let key = (edge.caller.clone(), edge.arg_index);
                        if db.tainted.insert(key.clone()) {
                            worklist.push_back(key);
                        }
                    }
                }
            }
        }
        db
    }

    pub fn tainted_names(&self) -> Vec<&(String, usize)> {
        self.tainted.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_sinks_are_tainted() {
        let db = ReflectedParamDb::compute(&[]);
        assert!(db.is_tainted("encoding/json.Marshal", 0));
    }

    #[test]
    fn taint_propagates_one_hop_backwards() {
        let edges = vec![CallEdge {
            caller: "example.com/foo.Save".to_string(),
            callee: "encoding/json.Marshal".to_string(),
            arg_index: 0,
        }];
        let db = ReflectedParamDb::compute(&edges);
        assert!(db.is_tainted("example.com/foo.Save", 0));
    }

    #[test]
    fn taint_propagates_transitively() {
        let edges = vec![
            CallEdge {
                caller: "example.com/foo.Outer".to_string(),
                callee: "example.com/foo.Inner".to_string(),
                arg_index: 0,
            },
            CallEdge {
                caller: "example.com/foo.Inner".to_string(),
                callee: "encoding/json.Marshal".to_string(),
                arg_index: 0,
            },
        ];
        let db = ReflectedParamDb::compute(&edges);
        assert!(db.is_tainted("example.com/foo.Outer", 0));
    }

    #[test]
    fn unrelated_arg_index_is_not_tainted() {
        let edges = vec![CallEdge {
            caller: "example.com/foo.Save".to_string(),
            callee: "encoding/json.Marshal".to_string(),
            arg_index: 1,
        }];
        let db = ReflectedParamDb::compute(&edges);
        assert!(!db.is_tainted("example.com/foo.Save", 1));
    }
}
