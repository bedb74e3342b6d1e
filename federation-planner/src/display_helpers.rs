use std::fmt;
use std::fmt::Display;

/// Indentation-aware writer used to print plans, operations and subgraph requests.
pub(crate) struct State<'a, 'f> {
    depth: usize,
    out: &'a mut fmt::Formatter<'f>,
}

impl<'a, 'f> State<'a, 'f> {
    pub(crate) fn new(out: &'a mut fmt::Formatter<'f>) -> Self {
        Self { depth: 0, out }
    }

    pub(crate) fn write(&mut self, value: impl Display) -> fmt::Result {
        write!(self.out, "{value}")
    }

    pub(crate) fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        self.out.write_fmt(args)
    }

    pub(crate) fn new_line(&mut self) -> fmt::Result {
        self.out.write_str("\n")?;
        (0..self.depth).try_for_each(|_| self.out.write_str("  "))
    }

    pub(crate) fn indent(&mut self) -> fmt::Result {
        self.depth += 1;
        self.new_line()
    }

    pub(crate) fn dedent(&mut self) -> fmt::Result {
        self.depth = self.depth.saturating_sub(1);
        self.new_line()
    }

    /// Writes a multi-line value, indenting its continuation lines to the current depth.
    pub(crate) fn write_lines(&mut self, value: impl Display) -> fmt::Result {
        for (index, line) in value.to_string().lines().enumerate() {
            if index > 0 {
                self.new_line()?;
            }
            self.write(line)?;
        }
        Ok(())
    }

    /// Writes `{`, every item on its own line one level deeper, then `}`. No items print `{}`.
    pub(crate) fn write_block<T>(
        &mut self,
        items: &[T],
        mut write_item: impl FnMut(&mut Self, &T) -> fmt::Result,
    ) -> fmt::Result {
        self.write("{")?;
        if items.is_empty() {
            return self.write("}");
        }
        self.indent()?;
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                self.new_line()?;
            }
            write_item(self, item)?;
        }
        self.dedent()?;
        self.write("}")
    }
}

/// Prints a slice as `[a, b, c]`.
pub(crate) struct DisplaySlice<'a, T>(pub(crate) &'a [T]);

impl<T: Display> Display for DisplaySlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, item) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nested(&'static [&'static [&'static str]]);

    impl Display for Nested {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            State::new(f).write_block(self.0, |state, inner| {
                state.write_block(inner, |state, line| state.write(line))
            })
        }
    }

    #[test]
    fn blocks_follow_indentation() {
        assert_eq!(
            Nested(&[&["a", "b"], &[]]).to_string(),
            "{\n  {\n    a\n    b\n  }\n  {}\n}"
        );
        assert_eq!(Nested(&[]).to_string(), "{}");
    }

    #[test]
    fn continuation_lines_follow_indentation() {
        struct Indented;

        impl Display for Indented {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut state = State::new(f);
                state.write("a ")?;
                state.indent()?;
                state.write_lines("{\n  b\n}")
            }
        }

        assert_eq!(Indented.to_string(), "a \n  {\n    b\n  }");
    }

    #[test]
    fn slices_are_bracketed() {
        assert_eq!(DisplaySlice(&[1, 2, 3]).to_string(), "[1, 2, 3]");
        assert_eq!(DisplaySlice::<u8>(&[]).to_string(), "[]");
    }
}
