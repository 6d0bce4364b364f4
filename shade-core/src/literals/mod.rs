//! Literal obfuscation engine (spec §4.3).

pub mod strategies;

use crate::ast::Expr;
use crate::entropy::MasterEntropy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strategies::{EncodedLiteral, LiteralStrategy, ShuffleStrategy, SplitStrategy, SpnStrategy, XorKeyStrategy};

/// Directives that disqualify the function (or the whole file) they
/// annotate from literal obfuscation, because the literal's exact bytes or
/// address must survive unmodified for the toolchain or runtime to find it.
const DANGEROUS_DIRECTIVES: &[&str] = &["go:linkname", "go:cgo_import_dynamic", "go:generate"];

pub struct WeightedRegistry {
    spn_weight: u32,
    xor_weight: u32,
    swap_weight: u32,
    split_weight: u32,
    shuffle_weight: u32,
}

impl Default for WeightedRegistry {
    /// SPN carries the majority weight since it's the only strategy with no
    /// fixed, recognizable shape; the other four exist for variety (spec
    /// §4.3 component-share notes).
    fn default() -> Self {
        Self {
            spn_weight: 50,
            xor_weight: 15,
            swap_weight: 15,
            split_weight: 10,
            shuffle_weight: 10,
        }
    }
}

impl WeightedRegistry {
    fn total(&self) -> u32 {
        self.spn_weight + self.xor_weight + self.swap_weight + self.split_weight + self.shuffle_weight
    }

    fn pick(&self, rng: &mut StdRng) -> Box<dyn LiteralStrategy> {
        let roll = rng.gen_range(0..self.total());
        let mut acc = self.spn_weight;
        if roll < acc {
            return Box::new(SpnStrategy { rounds: 4 + (roll % 3) as usize });
        }
        acc += self.xor_weight;
        if roll < acc {
            return Box::new(XorKeyStrategy);
        }
        acc += self.swap_weight;
        if roll < acc {
            return Box::new(strategies::SwapStrategy);
        }
        acc += self.split_weight;
        if roll < acc {
            return Box::new(SplitStrategy { chunk_len: 4 });
        }
        Box::new(ShuffleStrategy)
    }
}

/// True when `expr` is a literal that's both structurally eligible
/// (`Expr::is_obfuscatable_literal`) and not blocked by a dangerous
/// directive on its enclosing function, and not used in a context that
/// requires a compile-time constant (array length, const declaration).
pub fn is_eligible(expr: &Expr, directives: &[String], in_const_context: bool) -> bool {
    if in_const_context {
        return false;
    }
    if directives.iter().any(|d| DANGEROUS_DIRECTIVES.iter().any(|dd| d.contains(dd))) {
        return false;
    }
    expr.is_obfuscatable_literal()
}

/// Encodes one literal's bytes using a strategy drawn from `registry`,
/// seeded from the master entropy plus a caller-supplied disambiguator so
/// repeated literals in one function don't all pick the same strategy.
pub fn obfuscate_bytes(
    master: &MasterEntropy,
    registry: &WeightedRegistry,
    disambiguator: &str,
    plain: &[u8],
) -> EncodedLiteral {
    let seed_bytes = master.hkdf(b"literal-strategy-select", disambiguator.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&seed_bytes[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));
    let strategy = registry.pick(&mut rng);
    strategy.encode(plain, &mut rng)
}

/// A value supplied via the toolchain's `-X importpath.name=value` linker
/// flag bypasses the normal literal obfuscation path entirely, because it's
/// injected after compilation. Spec §4.3 requires these to still end up
/// obfuscated: the pipeline emits a synthesized `init` function that
/// decodes the value at startup and assigns it to the target variable,
/// rather than leaving it as a plaintext string in the data section.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkerValueRehydration {
    pub target_package: String,
    pub target_var: String,
    pub encoded: EncodedLiteral,
}

pub fn rehydrate_linker_value(
    master: &MasterEntropy,
    registry: &WeightedRegistry,
    target_package: &str,
    target_var: &str,
    value: &str,
) -> LinkerValueRehydration {
    let disambiguator = format!("{target_package}.{target_var}");
    let encoded = obfuscate_bytes(master, registry, &disambiguator, value.as_bytes());
    LinkerValueRehydration {
        target_package: target_package.to_string(),
        target_var: target_var.to_string(),
        encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterEntropy {
        MasterEntropy::derive(&[5u8; 32], &[6u8; 32])
    }

    #[test]
    fn const_context_excludes_eligibility() {
        let expr = Expr::IntLit(4);
        assert!(!is_eligible(&expr, &[], true));
        assert!(is_eligible(&expr, &[], false));
    }

    #[test]
    fn dangerous_directive_excludes_eligibility() {
        let expr = Expr::StringLit("x".into());
        let directives = vec!["//go:linkname foo bar".to_string()];
        assert!(!is_eligible(&expr, &directives, false));
    }

    #[test]
    fn non_literal_is_never_eligible() {
        let expr = Expr::Ident("x".into());
        assert!(!is_eligible(&expr, &[], false));
    }

    #[test]
    fn obfuscate_bytes_roundtrips_through_decode() {
        let m = master();
        let registry = WeightedRegistry::default();
        let enc = obfuscate_bytes(&m, &registry, "pkg.Func#0", b"top secret string");
        assert_eq!(enc.decode(), b"top secret string");
    }

    #[test]
    fn linker_value_rehydration_roundtrips() {
        let m = master();
        let registry = WeightedRegistry::default();
        let rehydrated = rehydrate_linker_value(&m, &registry, "main", "buildVersion", "v1.2.3");
        assert_eq!(rehydrated.encoded.decode(), b"v1.2.3");
    }

    #[test]
    fn different_disambiguators_tend_to_pick_varied_strategies() {
        let m = master();
        let registry = WeightedRegistry::default();
        let names: Vec<&'static str> = (0..12)
            .map(|i| obfuscate_bytes(&m, &registry, &format!("pkg.Func#{i}"), b"abc").strategy)
            .collect();
        let distinct: std::collections::HashSet<_> = names.iter().collect();
        assert!(distinct.len() > 1);
    }
}
