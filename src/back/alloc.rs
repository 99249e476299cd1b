//! The register allocator: George–Appel iterated coalescing over the
//! conflict/preference graph built from one function's liveness and each
//! command's `rel_spot_*`/`abs_spot_*`/`clobber` contracts.
//!
//! Grounded line-for-line on `examples/original_source/shivyc/asm_gen.py`'s
//! `NodeGraph` and `ASMGen._generate_graph` / `_simplify_all` / `_coalesce_all`
//! / `_freeze` / `_generate_spotmap` / `_generate_asm`.

use crate::back::homes;
use crate::back::liveness::{self, LiveSet};
use crate::back::spot::{Register, Spot};
use crate::common::{Map, Set};
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;

/// A node in the interference graph: either a real, unpinned `ILValue` the
/// allocator is free to place, or a pseudo-node standing in for a physical
/// register an absolute preference/conflict/clobber pins something to.
/// Pseudo-nodes mutually conflict (two different registers are, definitionally,
/// different spots) but are never themselves colored.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Node {
    Value(ILValue),
    Reg(Register),
}

/// The `K = 9` allocatable GPRs, i.e. `Register::ALLOCATABLE.len()`.
fn k() -> usize {
    Register::ALLOCATABLE.len()
}

/// The conflict/preference graph for one spill attempt. Mirrors `NodeGraph`
/// in `asm_gen.py`: `real_nodes` are the colorable `ILValue`s, `all_nodes`
/// additionally includes the register pseudo-nodes.
#[derive(Clone, Default)]
struct NodeGraph {
    real_nodes: Vec<Node>,
    all_nodes: Vec<Node>,
    conf: Map<Node, Vec<Node>>,
    pref: Map<Node, Vec<Node>>,
}

impl NodeGraph {
    fn new(free_values: &Set<ILValue>) -> NodeGraph {
        let mut g = NodeGraph::default();
        for v in free_values {
            let n = Node::Value(v.clone());
            g.real_nodes.push(n.clone());
            g.all_nodes.push(n.clone());
            g.conf.insert(n.clone(), Vec::new());
            g.pref.insert(n, Vec::new());
        }
        g
    }

    fn is_node(&self, n: &Node) -> bool {
        self.conf.contains_key(n)
    }

    /// Adds `n` as a pseudo (non-real) node if not already present. Every
    /// pseudo-node mutually conflicts with every other pseudo-node already in
    /// the graph — two distinct physical registers can never be merged.
    fn add_dummy_node(&mut self, n: Node) {
        if self.is_node(&n) {
            return;
        }
        let others: Vec<Node> =
            self.all_nodes.iter().filter(|o| !self.real_nodes.contains(o)).cloned().collect();
        for o in &others {
            self.conf.get_mut(o).unwrap().push(n.clone());
            self.conf.entry(n.clone()).or_default().push(o.clone());
        }
        self.conf.entry(n.clone()).or_insert_with(Vec::new);
        self.pref.entry(n.clone()).or_insert_with(Vec::new);
        self.all_nodes.push(n);
    }

    fn add_conflict(&mut self, a: Node, b: Node) {
        if a == b {
            return;
        }
        if !self.is_node(&a) {
            self.add_dummy_node(a.clone());
        }
        if !self.is_node(&b) {
            self.add_dummy_node(b.clone());
        }
        if !self.conf[&a].contains(&b) {
            self.conf.get_mut(&a).unwrap().push(b.clone());
            self.conf.get_mut(&b).unwrap().push(a);
        }
    }

    fn add_pref(&mut self, a: Node, b: Node) {
        if a == b {
            return;
        }
        if !self.is_node(&a) {
            self.add_dummy_node(a.clone());
        }
        if !self.is_node(&b) {
            self.add_dummy_node(b.clone());
        }
        if self.conf[&a].contains(&b) {
            return;
        }
        if !self.pref[&a].contains(&b) {
            self.pref.get_mut(&a).unwrap().push(b.clone());
            self.pref.get_mut(&b).unwrap().push(a);
        }
    }

    fn remove_pref(&mut self, a: &Node, b: &Node) {
        self.pref.get_mut(a).unwrap().retain(|n| n != b);
        self.pref.get_mut(b).unwrap().retain(|n| n != a);
    }

    fn confs(&self, n: &Node) -> &[Node] {
        &self.conf[n]
    }

    fn prefs(&self, n: &Node) -> &[Node] {
        &self.pref[n]
    }

    fn nodes(&self) -> &[Node] {
        &self.real_nodes
    }

    /// Removes `n` (a real node) from the graph entirely, returning its
    /// conflicting neighbours so the caller can record them for spotmap
    /// assignment in reverse order.
    fn pop(&mut self, n: &Node) -> Vec<Node> {
        let neighbours = self.conf.remove(n).unwrap_or_default();
        for nb in &neighbours {
            if let Some(v) = self.conf.get_mut(nb) {
                v.retain(|x| x != n);
            }
        }
        if let Some(prefs) = self.pref.remove(n) {
            for p in prefs {
                if let Some(v) = self.pref.get_mut(&p) {
                    v.retain(|x| x != n);
                }
            }
        }
        self.real_nodes.retain(|x| x != n);
        self.all_nodes.retain(|x| x != n);
        neighbours
    }

    /// Merges `from` into `to`: every conflict/preference `from` had becomes
    /// one `to` has, and `from` is removed. `to` survives; `from` is the node
    /// later lookups must redirect to `to`'s eventual spot.
    fn merge(&mut self, to: &Node, from: &Node) {
        let from_confs = self.conf.remove(from).unwrap_or_default();
        for c in from_confs {
            if &c == to {
                continue;
            }
            if let Some(v) = self.conf.get_mut(&c) {
                v.retain(|x| x != from);
            }
            self.add_conflict(to.clone(), c);
        }
        let from_prefs = self.pref.remove(from).unwrap_or_default();
        for p in from_prefs {
            if &p == to {
                continue;
            }
            if let Some(v) = self.pref.get_mut(&p) {
                v.retain(|x| x != from);
            }
            self.add_pref(to.clone(), p);
        }
        self.real_nodes.retain(|x| x != from);
        self.all_nodes.retain(|x| x != from);
    }
}

/// Statistics for `-z-reg-alloc-perf`, grounded on `asm_gen.py`'s
/// `arguments.show_reg_alloc_perf` report.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocStats {
    pub total_prefs: usize,
    pub matched_prefs: usize,
    pub total_values: usize,
    pub registered_values: usize,
}

pub struct AllocResult {
    pub spotmap: Map<ILValue, Spot>,
    pub frame_size: u64,
    pub stats: AllocStats,
    /// Per-command liveness restricted to register-allocation candidates —
    /// reused by `back::emit` to implement the `get_reg` vendor closure's
    /// "not live across this command" rule without recomputing it.
    pub live: Vec<LiveSet>,
}

/// Runs the full allocator for one function: home-spot pre-allocation,
/// liveness, graph construction, iterated simplify/coalesce/freeze/spill,
/// and final spotmap assignment. `global_spotmap` supplies spots for every
/// value that is never a candidate for register allocation (literals,
/// globals, string literals, function labels); `start_offset` is the running
/// stack-frame byte offset to continue assigning spill/home slots from (16
/// for a fresh function, to leave room below `rbp` for nothing else).
pub fn allocate(
    commands: &[Box<dyn ILCmd>],
    global_spotmap: &Map<ILValue, Spot>,
    start_offset: u64,
) -> (AllocResult, Map<ILValue, Spot>) {
    let mut all_values: Set<ILValue> = Set::new();
    for cmd in commands {
        all_values.extend(cmd.inputs());
        all_values.extend(cmd.outputs());
        for (_, vs) in cmd.references() {
            all_values.extend(vs);
        }
    }
    let free_values: Set<ILValue> =
        all_values.iter().filter(|v| !global_spotmap.contains_key(v)).cloned().collect();

    let needed_homes = homes::needs_home(commands, &free_values);
    let (home_map, offset_after_homes) = homes::assign_homes(&needed_homes, start_offset);

    let alloc_candidates: Set<ILValue> =
        free_values.iter().filter(|v| !home_map.contains_key(v)).cloned().collect();

    let live = liveness::analyze(commands, &alloc_candidates);

    let mut g = NodeGraph::new(&alloc_candidates);
    build_graph(commands, &live, &mut g);

    let (spotmap_from_regs, offset_after_spills, stats) =
        run_allocation(g, commands, offset_after_homes);

    let mut spotmap = global_spotmap.clone();
    spotmap.extend(home_map.iter().map(|(v, s)| (v.clone(), s.clone())));
    spotmap.extend(spotmap_from_regs);

    let result = AllocResult {
        spotmap: spotmap.clone(),
        frame_size: round_up_16(offset_after_spills),
        stats,
        live,
    };
    (result, home_map)
}

fn round_up_16(n: u64) -> u64 {
    (n + 15) & !15
}

/// Builds conflict edges (same-liveness interference, `rel_spot_conf`,
/// `abs_spot_conf`, clobber-vs-live-across) and preference edges
/// (`rel_spot_pref`, `abs_spot_pref`) for every command, per
/// `asm_gen.py`'s `_generate_graph`.
fn build_graph(commands: &[Box<dyn ILCmd>], live: &[LiveSet], g: &mut NodeGraph) {
    for (i, cmd) in commands.iter().enumerate() {
        let live_across: Set<ILValue> = live[i].live_in.intersection(&live[i].live_out).cloned().collect();
        let mut live_vars: Set<ILValue> = live[i].live_in.clone();
        live_vars.extend(live[i].live_out.iter().cloned());

        // Values simultaneously live need distinct spots.
        let live_list: Vec<&ILValue> = live_vars.iter().collect();
        for (a_idx, a) in live_list.iter().enumerate() {
            for b in live_list.iter().skip(a_idx + 1) {
                g.add_conflict(Node::Value((*a).clone()), Node::Value((*b).clone()));
            }
        }

        for (a, b) in cmd.rel_spot_conf() {
            g.add_conflict(Node::Value(a), Node::Value(b));
        }
        for (v, spot) in cmd.abs_spot_conf() {
            if let Spot::Register(r) = spot {
                g.add_conflict(Node::Value(v), Node::Reg(r));
            }
        }
        for reg in cmd.clobber() {
            for v in &live_across {
                if !cmd.outputs().contains(v) {
                    g.add_conflict(Node::Value(v.clone()), Node::Reg(reg));
                }
            }
        }

        for (a, b) in cmd.rel_spot_pref() {
            g.add_pref(Node::Value(a), Node::Value(b));
        }
        for (v, spot) in cmd.abs_spot_pref() {
            if let Spot::Register(r) = spot {
                g.add_pref(Node::Value(v), Node::Reg(r));
            }
        }
    }
}

/// The outer spill-retry loop: repeatedly simplify/coalesce/freeze a working
/// copy of the graph; if real nodes remain once no further progress can be
/// made, pick the max-degree node as a spill candidate and restart from the
/// original graph minus every spill chosen so far.
fn run_allocation(
    original: NodeGraph,
    commands: &[Box<dyn ILCmd>],
    start_offset: u64,
) -> (Map<ILValue, Spot>, u64, AllocStats) {
    let mut spilled: Vec<Node> = Vec::new();

    loop {
        let mut g = original.clone();
        for n in &spilled {
            if g.is_node(n) {
                g.pop(n);
            }
        }

        let mut removed_nodes: Vec<Node> = Vec::new();
        let mut merged_nodes: Map<Node, Vec<Node>> = Map::new();

        loop {
            loop {
                let simplified = simplify_all(&mut g, &mut removed_nodes);
                let coalesced = coalesce_all(&mut g, &mut merged_nodes);
                if !simplified && !coalesced {
                    break;
                }
            }
            if !freeze(&mut g) {
                break;
            }
        }

        if g.nodes().is_empty() {
            while let Some(n) = g.all_nodes.first().cloned() {
                g.pop(&n);
                removed_nodes.push(n);
            }
            let (spotmap, offset) =
                generate_spotmap(&original, &removed_nodes, &merged_nodes, &spilled, start_offset);
            let stats = compute_stats(commands, &spotmap);
            return (spotmap, offset, stats);
        }

        let worst = g
            .nodes()
            .iter()
            .max_by_key(|n| g.confs(n).len())
            .cloned()
            .expect("non-empty node set has a max");
        spilled.push(worst);
    }
}

/// Pops every real node with preference-edge count 0 and conflict degree
/// < K, repeatedly, until no more qualify. Returns whether any node was
/// removed.
fn simplify_all(g: &mut NodeGraph, removed: &mut Vec<Node>) -> bool {
    let mut any = false;
    loop {
        let candidate = g
            .nodes()
            .iter()
            .find(|n| g.prefs(n).is_empty() && g.confs(n).len() < k())
            .cloned();
        match candidate {
            Some(n) => {
                g.pop(&n);
                removed.push(n);
                any = true;
            }
            None => break,
        }
    }
    any
}

/// Briggs–George conservative coalescing: for each real node with a
/// preference edge, try to merge it into the other endpoint. Real-vs-real
/// merges require the combined conflict degree to stay below K; real-vs-
/// register merges require every neighbour of the real node to either
/// already conflict with the register or have degree < K.
fn coalesce_all(g: &mut NodeGraph, merged: &mut Map<Node, Vec<Node>>) -> bool {
    let mut any = false;
    loop {
        let mut did = false;
        'search: for v1 in g.nodes().to_vec() {
            for v2 in g.prefs(&v1).to_vec() {
                if g.confs(&v1).contains(&v2) {
                    continue;
                }
                match &v2 {
                    Node::Reg(_) => {
                        let mut safe = true;
                        for t in g.confs(&v1).to_vec() {
                            if g.confs(&t).contains(&v2) {
                                continue;
                            }
                            if g.confs(&t).len() < k() {
                                continue;
                            }
                            safe = false;
                            break;
                        }
                        if safe {
                            record_merge(merged, &v2, &v1);
                            g.merge(&v2, &v1);
                            did = true;
                            any = true;
                            break 'search;
                        }
                    }
                    Node::Value(_) => {
                        let mut combined: Set<Node> =
                            g.confs(&v1).iter().cloned().collect();
                        combined.extend(g.confs(&v2).iter().cloned());
                        if combined.len() < k() {
                            record_merge(merged, &v1, &v2);
                            g.merge(&v1, &v2);
                            did = true;
                            any = true;
                            break 'search;
                        }
                    }
                }
            }
        }
        if !did {
            break;
        }
    }
    any
}

fn record_merge(merged: &mut Map<Node, Vec<Node>>, keep: &Node, gone: &Node) {
    let mut moved = merged.remove(gone).unwrap_or_default();
    moved.push(gone.clone());
    merged.entry(keep.clone()).or_default().append(&mut moved);
}

/// Removes one preference edge — between the two nodes with the lowest
/// combined conflict degree that still share one — unblocking simplify.
/// Returns whether an edge was found and removed.
fn freeze(g: &mut NodeGraph) -> bool {
    let mut by_degree: Vec<Node> = g.all_nodes.clone();
    by_degree.sort_by_key(|n| g.confs(n).len());

    for (i, a) in by_degree.iter().enumerate() {
        for b in by_degree.iter().skip(i + 1) {
            if g.prefs(a).contains(b) {
                let (a, b) = (a.clone(), b.clone());
                g.remove_pref(&a, &b);
                return true;
            }
        }
    }
    false
}

/// Walks `removed_nodes` in reverse (the order they were simplified away, so
/// popping in reverse restores each node's full neighbour set before
/// assigning it), giving each node the first allocatable register none of
/// its conflicting neighbours (transitively through merges) already holds.
/// Spilled nodes get a fresh `[rbp - offset]` slot instead.
fn generate_spotmap(
    original: &NodeGraph,
    removed_nodes: &[Node],
    merged: &Map<Node, Vec<Node>>,
    spilled: &[Node],
    start_offset: u64,
) -> (Map<ILValue, Spot>, u64) {
    let mut assigned: Map<Node, Spot> = Map::new();

    for n in removed_nodes.iter().rev() {
        if let Node::Reg(r) = n {
            assigned.insert(n.clone(), Spot::Register(*r));
            continue;
        }
        let conflicting_regs = conflicting_registers(original, merged, n, &assigned);
        let chosen = Register::ALLOCATABLE.iter().rev().find(|r| !conflicting_regs.contains(r)).copied();
        let spot = match chosen {
            Some(r) => Spot::Register(r),
            None => unreachable!("simplify/coalesce/freeze/spill guarantees a free register for every surviving node"),
        };
        assigned.insert(n.clone(), spot.clone());
        if let Some(aliases) = merged.get(n) {
            for a in aliases {
                assigned.insert(a.clone(), spot.clone());
            }
        }
    }

    let mut offset = start_offset;
    let mut spotmap: Map<ILValue, Spot> = Map::new();
    for n in spilled {
        if let Node::Value(v) = n {
            offset += v.ctype().size();
            let spot = Spot::Memory(crate::back::spot::MemSpot::simple(Register::Rbp, -(offset as i64)));
            spotmap.insert(v.clone(), spot);
        }
    }
    for (n, spot) in &assigned {
        if let Node::Value(v) = n {
            spotmap.entry(v.clone()).or_insert_with(|| spot.clone());
        }
    }

    (spotmap, offset)
}

/// All registers that conflict with `n`, directly or via a merged-away
/// alias, among nodes already assigned.
fn conflicting_registers(
    original: &NodeGraph,
    merged: &Map<Node, Vec<Node>>,
    n: &Node,
    assigned: &Map<Node, Spot>,
) -> Set<Register> {
    let mut members = vec![n.clone()];
    if let Some(aliases) = merged.get(n) {
        members.extend(aliases.iter().cloned());
    }

    let mut regs = Set::new();
    for m in &members {
        for c in original.confs(m) {
            if let Some(Spot::Register(r)) = assigned.get(c) {
                regs.insert(*r);
            }
            if let Node::Reg(r) = c {
                regs.insert(*r);
            }
        }
    }
    regs
}

fn compute_stats(commands: &[Box<dyn ILCmd>], spotmap: &Map<ILValue, Spot>) -> AllocStats {
    let mut stats = AllocStats::default();
    let mut seen: Set<ILValue> = Set::new();
    for cmd in commands.iter() {
        for (a, b) in cmd.rel_spot_pref() {
            stats.total_prefs += 1;
            if spotmap.get(&a) == spotmap.get(&b) {
                stats.matched_prefs += 1;
            }
        }
        for v in cmd.inputs().into_iter().chain(cmd.outputs()) {
            if seen.insert(v.clone()) {
                stats.total_values += 1;
                if matches!(spotmap.get(&v), Some(Spot::Register(_))) {
                    stats.registered_values += 1;
                }
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::il_cmd::math::Add;
    use crate::types::int;

    #[test]
    fn simple_chain_allocates_without_spilling() {
        let a = ILValue::new(int());
        let b = ILValue::new(int());
        let c = ILValue::new(int());
        let commands: Vec<Box<dyn ILCmd>> =
            vec![Box::new(Add { out: c.clone(), lhs: a.clone(), rhs: b.clone(), size: 4 })];

        let (result, _homes) = allocate(&commands, &Map::new(), 16);
        assert!(matches!(result.spotmap.get(&a), Some(Spot::Register(_))));
        assert!(matches!(result.spotmap.get(&b), Some(Spot::Register(_))));
        assert!(matches!(result.spotmap.get(&c), Some(Spot::Register(_))));
    }

    #[test]
    fn add_prefers_coalescing_out_with_lhs() {
        let a = ILValue::new(int());
        let b = ILValue::new(int());
        let c = ILValue::new(int());
        let commands: Vec<Box<dyn ILCmd>> =
            vec![Box::new(Add { out: c.clone(), lhs: a.clone(), rhs: b.clone(), size: 4 })];
        let (result, _) = allocate(&commands, &Map::new(), 16);
        assert_eq!(result.spotmap.get(&a), result.spotmap.get(&c));
    }
}
