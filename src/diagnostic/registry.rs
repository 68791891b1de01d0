/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    /// Brief description for tooling.
    pub short: &'static str,
    /// Full explanation for `--explain`.
    pub long: &'static str,
}

/// All stable compile error codes.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Syntax ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PXF-S001",
        short: "unterminated string",
        long: r#"## PXF-S001: unterminated string

A single-quoted string literal has no closing quote.

**Example:**

    echo('value = ', x)     -- fine
    echo('value = , x)      -- the quote opened before `value` never closes

Inside a string, write `\'` for a quote and `\\` for a backslash.
"#,
    },
    ErrorEntry {
        code: "PXF-S002",
        short: "unbalanced brackets",
        long: r#"## PXF-S002: unbalanced brackets

A `(` or `[` has no partner, a closing bracket appears without an
opener, or the two kinds are crossed as in `(1,2]`.

**Example:**

    sqrt(x*x + y*y

**Fix:**

    sqrt(x*x + y*y)
"#,
    },
    ErrorEntry {
        code: "PXF-S003",
        short: "empty expression",
        long: r#"## PXF-S003: empty expression

An operand, argument, vector literal or string is empty.

**Examples:**

    1 +         -- right operand of `+` is missing
    max(1,,2)   -- empty argument
    []          -- vectors need at least one component
    ''          -- strings need at least one character
"#,
    },
    ErrorEntry {
        code: "PXF-S004",
        short: "invalid expression",
        long: r#"## PXF-S004: invalid expression

The text is not a number, a name, a call, a vector, a string, or an
operator applied to operands.

**Example:**

    1 2         -- two operands with no operator between them
    x $ y       -- `$` is not an operator
"#,
    },
    ErrorEntry {
        code: "PXF-S005",
        short: "nesting too deep",
        long: r#"## PXF-S005: nesting too deep

The formula nests deeper than the recursion ceiling (`max_depth`,
256 by default). Macro expansions count toward the ceiling, so a macro
that calls itself always ends here.

**Example:**

    f(v) = f(v) + 1; f(x)

Raise `max_depth` in the settings file if the nesting is intended.
"#,
    },
    ErrorEntry {
        code: "PXF-S006",
        short: "wrong argument count",
        long: r#"## PXF-S006: wrong argument count

A built-in function or accessor received more or fewer arguments
than it takes.

**Examples:**

    sin(1, 2)             -- sin takes one argument
    i(1,2,3,4,5,6,7)      -- at most x,y,z,c plus interpolation and boundary
"#,
    },
    ErrorEntry {
        code: "PXF-S007",
        short: "missing ':' in conditional",
        long: r#"## PXF-S007: missing ':' in conditional

A `?` has no matching `:` at the same nesting level.

**Example:**

    x > 10 ? 1

**Fix:**

    x > 10 ? 1 : 0
"#,
    },

    // ── Type ─────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PXF-T001",
        short: "scalar/vector mismatch",
        long: r#"## PXF-T001: scalar/vector mismatch

A scalar was required and a vector was given, or the other way round.
Conditions, logical operators, indices and pixel coordinates are
scalars; a variable keeps the shape of its first assignment.

**Examples:**

    [1,2] && 1        -- `&&` needs scalars
    a = 1; a = [1,2]  -- `a` is a scalar

Reduce a vector with `norm()`, `sum()`, `max()` or an index like `V[0]`.
"#,
    },
    ErrorEntry {
        code: "PXF-T002",
        short: "vector size mismatch",
        long: r#"## PXF-T002: vector size mismatch

Two vectors combined component-wise, the branches of a conditional, or
a vector assigned to a variable have different sizes. Matrix functions
also report this when a size is not square or does not divide evenly.

**Examples:**

    [1,2] + [1,2,3]
    c ? [1,2] : 0
    det([1,2,3])
"#,
    },
    ErrorEntry {
        code: "PXF-T003",
        short: "not assignable",
        long: r#"## PXF-T003: not assignable

The left side of `=` or of a compound assignment is not a variable, a
vector element `V[k]`, or a pixel accessor.

**Example:**

    1 = x
    (a + b) = 2
"#,
    },
    ErrorEntry {
        code: "PXF-T004",
        short: "constant required",
        long: r#"## PXF-T004: constant required

The value must be known when the formula is compiled: `const`
initialisers, slice lengths, `eye()` sizes, crop sizes, matrix column
counts and the list index of vector accessors like `I(#k)`.

**Example:**

    n = 3; V[0, n]      -- `n` is a variable

**Fix:**

    const n = 3; V[0, n]

Sizes taken from constants are also capped by `max_vector_len` (1048576
by default), so `eye(100000)` or `crop(0,0,0,0,65536,65536,1,1)` end
here instead of allocating gigabytes.
"#,
    },
    ErrorEntry {
        code: "PXF-T005",
        short: "no image bound",
        long: r#"## PXF-T005: no image bound

A vector accessor (`I`, `J`, `crop()`) needs the channel count of an
image, but no image (or list image) was bound when compiling, or the
image has no channels.
"#,
    },

    // ── Reference ────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "PXF-R001",
        short: "undefined variable",
        long: r#"## PXF-R001: undefined variable

A name is read before anything was assigned to it, and it is not a
reserved name such as `x`, `w` or `pi`.

**Example:**

    a + 1

**Fix:**

    a = 0; a + 1
"#,
    },
    ErrorEntry {
        code: "PXF-R002",
        short: "unknown function",
        long: r#"## PXF-R002: unknown function

A call names neither a built-in function nor a macro defined earlier
in the formula.

**Example:**

    sqroot(x)

**Fix:**

    sqrt(x)
"#,
    },
    ErrorEntry {
        code: "PXF-R003",
        short: "assignment to a reserved name or constant",
        long: r#"## PXF-R003: assignment to a reserved name or constant

Reserved names (`x y z c t w h d s pi e i I R G B A`, the image
statistics, ...) and names declared with `const` cannot be written.
Only `interpolation` and `boundary` are reserved and assignable.

**Example:**

    const k = 2; k = 3
    pi = 3
"#,
    },
    ErrorEntry {
        code: "PXF-R004",
        short: "index out of bounds",
        long: r#"## PXF-R004: index out of bounds

A constant index is outside the vector. Indices run from 0 to
`size(V) - 1`. Indices computed at run time read NaN instead.

**Example:**

    [1,2,3][3]
"#,
    },
    ErrorEntry {
        code: "PXF-R005",
        short: "macro arity or redefinition",
        long: r#"## PXF-R005: macro arity or redefinition

A macro was called with the wrong number of arguments, redefined with a
different number of parameters, or defined with the name of a built-in
function.

**Examples:**

    f(a) = a*2; f(1, 2)
    sin(v) = v
"#,
    },
];

/// Look up an error entry by code (e.g. `"PXF-T002"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let e = lookup("PXF-T002").expect("PXF-T002 should be in registry");
        assert_eq!(e.code, "PXF-T002");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("PXF-T002"));
        assert!(lookup("pxf-r001").is_some());
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("PXF-X999").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn long_text_names_its_code() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.starts_with(&format!("## {}", entry.code)), "{} heading", entry.code);
        }
    }
}
