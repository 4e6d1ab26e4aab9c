//! Human-readable cache metrics.
//!
//! Renders per-query hit/miss counters, hit ratio, invalidation counts and
//! resident entry counts, plus the unknown-query diagnostics. The string is
//! intended to be served as-is from whatever debug endpoint the embedding
//! application exposes.

use crate::registry::Registry;

pub fn render_report(registry: &Registry) -> String {
    let stats = registry.stats();
    let mut out = String::new();

    out.push_str(&format!("result caches: {}\n", stats.len()));
    out.push_str(&format!(
        "{:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>7}  query\n",
        "hits", "misses", "loads", "forgets", "purges", "entries", "ratio"
    ));
    for s in &stats {
        out.push_str(&format!(
            "{:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>6.1}%  {}\n",
            s.hits,
            s.misses,
            s.loads,
            s.forgets,
            s.purges,
            s.entry_count,
            s.hit_rate * 100.0,
            s.query
        ));
    }

    let unknown = registry.unknown_queries();
    if !unknown.is_empty() {
        out.push_str(&format!("unknown queries: {}\n", unknown.len()));
        for (query, count) in unknown {
            out.push_str(&format!("{:>8}x {}\n", count, query));
        }
    }

    out
}
