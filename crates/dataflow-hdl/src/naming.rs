//! Name mangling and the anonymous-value/struct/fp-constant/fptr-type
//! counters (spec §4.5 "Name mangling").
//!
//! Per the Design Notes ("Global counters ... reimplement as fields of the
//! emitter object rather than module-level state"), every counter here
//! lives on [`NameMangler`], constructed fresh per emitted `.c` file so two
//! filters emitted from the same `Module` never collide and a rerun is
//! deterministic.

/// Escapes a source identifier's non-alphanumeric characters to `_<hex>_`,
/// so that e.g. a mangled function name containing `::` or a source name
/// with Unicode survives as a legal C identifier. Leaves `_` untouched --
/// it is already a legal, boring C identifier character that source names
/// commonly contain (`foo_bar`, `l_field`).
pub fn escape_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push_str(&format!("_{:x}_", ch as u32));
        }
    }
    if out.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        out.insert(0, '_');
    }
    out
}

/// Per-file counters for anonymous values, unnamed structs, floating-point
/// constant temporaries, and function-pointer type names (spec §4.5).
#[derive(Debug, Default)]
pub struct NameMangler {
    anon_value: u32,
    anon_struct: u32,
    fp_const: u32,
    fptr_type: u32,
    bitcast_tmp: u32,
    phi_shadow_seen: u32,
}

impl NameMangler {
    pub fn new() -> Self {
        NameMangler::default()
    }

    /// Name for an SSA value with no source-level name: `l_val_<n>`.
    pub fn anon_value(&mut self) -> String {
        let n = self.anon_value;
        self.anon_value += 1;
        format!("l_val_{n}")
    }

    /// Name for a struct with no source-level name (an array wrapper or a
    /// synthesised aggregate): `l_struct_<n>`.
    pub fn anon_struct(&mut self) -> String {
        let n = self.anon_struct;
        self.anon_struct += 1;
        format!("l_struct_{n}")
    }

    /// Name for a materialised floating-point constant temporary:
    /// `l_fpconst_<n>`.
    pub fn fp_const(&mut self) -> String {
        let n = self.fp_const;
        self.fp_const += 1;
        format!("l_fpconst_{n}")
    }

    /// Function-pointer type name: `l_fptr_<n>` (spec §4.5).
    pub fn fptr_type(&mut self) -> String {
        let n = self.fptr_type;
        self.fptr_type += 1;
        format!("l_fptr_{n}")
    }

    /// Name for a bitcast union temporary.
    pub fn bitcast_tmp(&mut self) -> String {
        let n = self.bitcast_tmp;
        self.bitcast_tmp += 1;
        format!("l_bitcast_{n}")
    }

    /// Counts a PHI shadow-variable allocation, purely for diagnostics; the
    /// shadow's name itself is derived from the PHI's own value name (see
    /// `emit_c::phi_shadow_name`), not from this counter.
    pub fn note_phi_shadow(&mut self) {
        self.phi_shadow_seen += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_non_alnum_to_hex_escape() {
        assert_eq!(escape_ident("a-b"), "a_2d_b");
        assert_eq!(escape_ident("counter"), "counter");
        assert_eq!(escape_ident("n_1"), "n_1");
    }

    #[test]
    fn leading_digit_gets_prefixed() {
        assert_eq!(escape_ident("3count"), "_3count");
    }

    #[test]
    fn counters_increase_monotonically_and_independently() {
        let mut m = NameMangler::new();
        assert_eq!(m.anon_value(), "l_val_0");
        assert_eq!(m.anon_value(), "l_val_1");
        assert_eq!(m.anon_struct(), "l_struct_0");
        assert_eq!(m.fptr_type(), "l_fptr_0");
    }
}
