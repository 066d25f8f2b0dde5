//! Symbolic expressions: relocation-like expressions over symbols.

use crate::Symbol;

/// A symbol plus constant offset: `sym + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymAddrConst {
    /// Constant displacement from the symbol.
    pub offset: i64,
    /// The referenced symbol.
    pub symbol: Symbol,
}

/// A scaled symbol difference plus constant: `(sym1 - sym2) / scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymAddrAddr {
    /// Divisor applied to the difference.
    pub scale: i64,
    /// Constant displacement.
    pub offset: i64,
    /// The minuend symbol.
    pub symbol1: Symbol,
    /// The subtrahend symbol.
    pub symbol2: Symbol,
}

/// A stack-relative symbol plus constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymStackConst {
    /// Constant displacement from the symbol.
    pub offset: i64,
    /// The referenced symbol.
    pub symbol: Symbol,
}

/// The operation variants of a symbolic expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymExprKind {
    /// `sym + offset`.
    SymAddrConst(SymAddrConst),
    /// `(sym1 - sym2) / scale + offset`.
    SymAddrAddr(SymAddrAddr),
    /// Stack-relative `sym + offset`.
    SymStackConst(SymStackConst),
}

/// Architecture-specific relocation attributes of a symbolic expression.
///
/// Wire codes are stable: new attributes may be appended but existing codes
/// are never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SymAttribute {
    /// Global offset table entry.
    Got = 0,
    /// PC-relative GOT reference.
    GotRelPc = 1,
    /// Procedure linkage table entry.
    Plt = 2,
    /// TLS general dynamic model.
    TlsGd = 3,
    /// TLS local dynamic model.
    TlsLd = 4,
    /// TLS local dynamic module id.
    TlsLdm = 5,
    /// TLS dynamic thread pointer relative.
    TlsDtpRel = 6,
    /// TLS thread pointer offset.
    TlsTpOff = 7,
}

impl SymAttribute {
    /// All attributes, in code order.
    pub const ALL: [SymAttribute; 8] = [
        SymAttribute::Got,
        SymAttribute::GotRelPc,
        SymAttribute::Plt,
        SymAttribute::TlsGd,
        SymAttribute::TlsLd,
        SymAttribute::TlsLdm,
        SymAttribute::TlsDtpRel,
        SymAttribute::TlsTpOff,
    ];

    /// The stable wire code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decode a stable wire code.
    pub fn from_code(code: u32) -> Option<SymAttribute> {
        SymAttribute::ALL.get(code as usize).copied()
    }
}

/// A set of [`SymAttribute`] flags packed into a bit mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymAttributes(u32);

impl SymAttributes {
    /// The empty set.
    pub fn new() -> Self {
        SymAttributes(0)
    }

    /// Rebuild a set from its raw bit mask.
    pub fn from_bits(bits: u32) -> Self {
        SymAttributes(bits)
    }

    /// The raw bit mask.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Add an attribute.
    pub fn insert(&mut self, attr: SymAttribute) {
        self.0 |= 1 << attr.code();
    }

    /// Remove an attribute.
    pub fn remove(&mut self, attr: SymAttribute) {
        self.0 &= !(1 << attr.code());
    }

    /// Whether the set contains `attr`.
    pub fn contains(self, attr: SymAttribute) -> bool {
        self.0 & (1 << attr.code()) != 0
    }

    /// Whether the set is empty.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the attributes present, in code order.
    pub fn iter(self) -> impl Iterator<Item = SymAttribute> {
        SymAttribute::ALL
            .into_iter()
            .filter(move |attr| self.contains(*attr))
    }
}

/// A relocation-like expression recorded at an offset within a byte
/// interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolicExpression {
    /// The operation variant.
    pub kind: SymExprKind,
    /// Relocation attributes.
    pub attributes: SymAttributes,
}

impl SymbolicExpression {
    /// Build a `sym + offset` expression.
    pub fn addr_const(symbol: Symbol, offset: i64) -> Self {
        SymbolicExpression {
            kind: SymExprKind::SymAddrConst(SymAddrConst { offset, symbol }),
            attributes: SymAttributes::new(),
        }
    }

    /// Build a `(sym1 - sym2) / scale + offset` expression.
    pub fn addr_addr(symbol1: Symbol, symbol2: Symbol, scale: i64, offset: i64) -> Self {
        SymbolicExpression {
            kind: SymExprKind::SymAddrAddr(SymAddrAddr {
                scale,
                offset,
                symbol1,
                symbol2,
            }),
            attributes: SymAttributes::new(),
        }
    }

    /// Build a stack-relative `sym + offset` expression.
    pub fn stack_const(symbol: Symbol, offset: i64) -> Self {
        SymbolicExpression {
            kind: SymExprKind::SymStackConst(SymStackConst { offset, symbol }),
            attributes: SymAttributes::new(),
        }
    }

    /// Attach an attribute, builder style.
    pub fn with_attribute(mut self, attr: SymAttribute) -> Self {
        self.attributes.insert(attr);
        self
    }

    /// The symbols the expression references, in operand order.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol> {
        let pair = match self.kind {
            SymExprKind::SymAddrConst(e) => (e.symbol, None),
            SymExprKind::SymAddrAddr(e) => (e.symbol1, Some(e.symbol2)),
            SymExprKind::SymStackConst(e) => (e.symbol, None),
        };
        std::iter::once(pair.0).chain(pair.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;

    #[test]
    fn test_attribute_set_roundtrips_bits() {
        let mut attrs = SymAttributes::new();
        attrs.insert(SymAttribute::Got);
        attrs.insert(SymAttribute::TlsTpOff);
        assert!(attrs.contains(SymAttribute::Got));
        assert!(!attrs.contains(SymAttribute::Plt));
        let restored = SymAttributes::from_bits(attrs.bits());
        assert_eq!(
            restored.iter().collect::<Vec<_>>(),
            vec![SymAttribute::Got, SymAttribute::TlsTpOff]
        );
        attrs.remove(SymAttribute::Got);
        assert!(!attrs.contains(SymAttribute::Got));
    }

    #[test]
    fn test_expression_symbols() {
        let mut ctx = Context::new();
        let a = Symbol::new(&mut ctx, "a");
        let b = Symbol::new(&mut ctx, "b");
        let expr = SymbolicExpression::addr_addr(a, b, 1, 0);
        assert_eq!(expr.symbols().collect::<Vec<_>>(), vec![a, b]);
        let expr = SymbolicExpression::addr_const(a, 4);
        assert_eq!(expr.symbols().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_attribute_codes_are_stable() {
        for attr in SymAttribute::ALL {
            assert_eq!(SymAttribute::from_code(attr.code()), Some(attr));
        }
        assert_eq!(SymAttribute::from_code(99), None);
    }
}
