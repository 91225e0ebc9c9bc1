// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The deb822 control file format.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

`control` files inside `.deb` packages, `Packages` indices and `Release`
files are all control files: a series of paragraphs separated by blank
lines, each paragraph an ordered list of `Name: value` fields. Values may
continue on following lines that begin with whitespace.
*/

use {
    crate::error::{RepositoryError, Result},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
    },
};

/// A field in a control file.
///
/// The value is stored as it appears after the colon, minus surrounding
/// whitespace on the first line. Continuation lines keep their leading
/// whitespace and are joined with `\n`. A value whose first line is empty
/// (as used by the checksum lists in `Release` files) starts with `\n`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// Construct a multiline field whose first line is empty.
    ///
    /// Each line is emitted on its own continuation line, indented by a single space.
    pub fn multiline_from_lines(
        name: Cow<'a, str>,
        lines: impl Iterator<Item = String>,
    ) -> Self {
        let value = lines.fold(String::new(), |mut acc, line| {
            acc.push_str("\n ");
            acc.push_str(&line);
            acc
        });

        Self {
            name,
            value: value.into(),
        }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Obtain the value as a [&str].
    ///
    /// The value's original file formatting (including newlines and leading whitespace)
    /// is included.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Obtain an iterator of words in the value.
    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.value.as_ref().split_ascii_whitespace()
    }

    /// Obtain an iterator of non-empty lines in the value.
    ///
    /// Leading whitespace from each line is stripped.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value
            .lines()
            .map(|x| x.trim_start())
            .filter(|x| !x.is_empty())
    }

    /// Write the contents of this field to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        if self.value.starts_with('\n') {
            writer.write_all(b":")?;
        } else {
            writer.write_all(b": ")?;
        }
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
///
/// Paragraphs can only contain a single occurrence of a field and this is enforced through
/// the mutation APIs.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// A field with the same name (case insensitive compare) is replaced in place,
    /// preserving its position. New fields are appended.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        match self
            .fields
            .iter()
            .position(|cf| cf.name.eq_ignore_ascii_case(&field.name))
        {
            Some(index) => self.fields[index] = field,
            None => self.fields.push(field),
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Remove a field by name, returning whether it was present.
    pub fn remove_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|cf| !cf.name.eq_ignore_ascii_case(name));
        before != self.fields.len()
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in this paragraph.
    ///
    /// Iteration order is insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&'_ ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the raw string value of a field that must be present.
    pub fn required_field_str(&self, name: &str) -> Result<&str> {
        self.field_str(name)
            .ok_or_else(|| RepositoryError::ControlRequiredFieldMissing(name.to_string()))
    }

    /// Obtain the value of a field parsed as a [u64].
    pub fn field_u64(&self, name: &str) -> Option<Result<u64>> {
        self.field_str(name)
            .map(|v| v.trim().parse::<u64>().map_err(RepositoryError::from))
    }

    /// Obtain an iterator of words in the named field.
    pub fn iter_field_words(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        self.field(name).map(|f| f.iter_words())
    }

    /// Obtain an iterator of lines in the named field.
    pub fn iter_field_lines(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        self.field(name).map(|f| f.iter_lines())
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. However, an
    /// extra newline is not present. So if serializing multiple paragraphs, an
    /// additional line break must be written to effectively terminate this paragraph
    /// if the writer is not at EOF.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl<'a> std::fmt::Display for ControlField<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let separator = if self.value.starts_with('\n') { ":" } else { ": " };

        writeln!(f, "{}{}{}", self.name, separator, self.value)
    }
}

impl<'a> std::fmt::Display for ControlParagraph<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            write!(f, "{}", field)?;
        }

        Ok(())
    }
}

/// Holds parsing state for Debian control files.
///
/// Instances of this type are essentially fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph will be returned.
    /// Otherwise `Ok(None)` is returned.
    ///
    /// `Err` is returned if the control file in invalid.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_continuation = line.starts_with(' ') || line.starts_with('\t');

        // Empty lines signify the end of a paragraph. Flush any state.
        if is_empty_line {
            if let Some(field) = self.field.take() {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        // Comment lines are only meaningful in source package control files. Ignore them.
        if line.starts_with('#') {
            return Ok(None);
        }

        match (self.field.take(), is_continuation) {
            (Some(v), true) => {
                self.field = Some(v + line);
            }
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.to_string());
            }
            (None, true) => {
                return Err(RepositoryError::ControlParseError(format!(
                    "continuation line without a field: {}",
                    line.trim_end()
                )));
            }
            (None, false) => {
                self.field = Some(line.to_string());
            }
        }

        Ok(None)
    }

    /// Finish parsing, consuming self.
    ///
    /// If a non-empty paragraph is present in the instance, it will be returned. Else if there
    /// is no unflushed state, None is returned.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            RepositoryError::ControlParseError(format!(
                "error parsing line '{}'; missing colon",
                v.trim_end()
            ))
        })?;

        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(RepositoryError::ControlParseError(format!(
                "invalid field name in line '{}'",
                v.trim_end()
            )));
        }

        // Continuation lines keep their indentation; only the first line is trimmed.
        let value = value
            .trim_start_matches(|c| c == ' ' || c == '\t')
            .trim_end()
            .replace("\r\n", "\n");

        self.paragraph
            .set_field_from_string(Cow::Owned(name.to_string()), Cow::Owned(value));

        Ok(())
    }
}

/// A reader for [ControlParagraph].
///
/// Instances are bound to a reader, which is capable of feeding lines into a parser.
///
/// Instances can be consumed as an iterator. Each call into the iterator will attempt to
/// read a full paragraph from the underlying reader.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    /// Consumes the instance, returning the original reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph<'static>>> {
        let mut parser = match self.parser.take() {
            Some(parser) => parser,
            None => return Ok(None),
        };

        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line)? != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next().transpose()
    }
}

/// A debian control file.
///
/// A control file is an ordered series of paragraphs.
#[derive(Clone, Debug, Default)]
pub struct ControlFile<'a> {
    paragraphs: Vec<ControlParagraph<'a>>,
}

impl<'a> ControlFile<'a> {
    /// Construct a new instance by parsing data from a reader.
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<Self> {
        let paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        Ok(Self { paragraphs })
    }

    /// Parse a control file from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        Self::parse_reader(s.as_bytes())
    }

    /// Add a paragraph to this control file.
    pub fn add_paragraph(&mut self, p: ControlParagraph<'a>) {
        self.paragraphs.push(p);
    }

    /// Obtain paragraphs in this control file.
    pub fn paragraphs(&self) -> impl Iterator<Item = &ControlParagraph<'a>> {
        self.paragraphs.iter()
    }

    /// Obtain paragraphs in this control file, consuming self.
    pub fn into_paragraphs(self) -> impl Iterator<Item = ControlParagraph<'a>> {
        self.paragraphs.into_iter()
    }

    /// Serialize the control file to a writer.
    ///
    /// Paragraphs are separated by a single blank line.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for (i, p) in self.paragraphs.iter().enumerate() {
            if i > 0 {
                writer.write_all(b"\n")?;
            }
            p.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const PACKAGE_CONTROL: &str = indoc! {"
        Package: libfoo1
        Source: foo (1.2-1)
        Version: 1.2-1
        Architecture: amd64
        Maintainer: Someone <someone@example.com>
        Description: a library for foo
         Longer description of foo.
         .
         With a second paragraph.
    "};

    #[test]
    fn control_paragraph_field_semantics() {
        let mut p = ControlParagraph::default();

        // Same cased field name results in overwrite.
        p.set_field_from_string("foo".into(), "bar".into());
        p.set_field_from_string("foo".into(), "baz".into());
        assert_eq!(p.field_str("foo"), Some("baz"));

        // Different case results in overwrite, preserving position.
        p.set_field_from_string("other".into(), "value".into());
        p.set_field_from_string("FOO".into(), "bar".into());
        assert_eq!(p.field_str("foo"), Some("bar"));
        assert_eq!(p.iter_fields().next().unwrap().name(), "FOO");

        assert!(p.remove_field("Foo"));
        assert!(!p.has_field("foo"));
    }

    #[test]
    fn parse_package_control() -> Result<()> {
        let cf = ControlFile::parse_str(PACKAGE_CONTROL)?;
        let paragraphs = cf.paragraphs().collect::<Vec<_>>();
        assert_eq!(paragraphs.len(), 1);

        let p = paragraphs[0];
        assert_eq!(p.field_str("package"), Some("libfoo1"));
        assert_eq!(p.field_str("Source"), Some("foo (1.2-1)"));
        assert_eq!(
            p.iter_field_lines("Description").unwrap().collect::<Vec<_>>(),
            vec![
                "a library for foo",
                "Longer description of foo.",
                ".",
                "With a second paragraph."
            ]
        );
        assert_eq!(
            p.required_field_str("Maintainer")?,
            "Someone <someone@example.com>"
        );
        assert!(matches!(
            p.required_field_str("Missing"),
            Err(RepositoryError::ControlRequiredFieldMissing(_))
        ));

        Ok(())
    }

    #[test]
    fn write_preserves_content() -> Result<()> {
        let cf = ControlFile::parse_str(PACKAGE_CONTROL)?;

        let mut buffer = vec![];
        cf.write(&mut buffer)?;
        assert_eq!(String::from_utf8(buffer).unwrap(), PACKAGE_CONTROL);

        Ok(())
    }

    #[test]
    fn multiple_paragraphs() -> Result<()> {
        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(indoc! {"
            Package: a

            Package: b


            Package: c
        "}))
        .collect::<Result<Vec<_>>>()?;

        assert_eq!(
            paragraphs
                .iter()
                .map(|p| p.field_str("Package").unwrap())
                .collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );

        Ok(())
    }

    #[test]
    fn multiline_empty_first_line() -> Result<()> {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Codename".into(), "test".into());
        p.set_field(ControlField::multiline_from_lines(
            "SHA256".into(),
            ["abc 1 a".to_string(), "def 22 b/c".to_string()].into_iter(),
        ));

        let serialized = p.to_string();
        assert_eq!(serialized, "Codename: test\nSHA256:\n abc 1 a\n def 22 b/c\n");

        let reparsed = ControlFile::parse_str(&serialized)?
            .into_paragraphs()
            .next()
            .unwrap();
        assert_eq!(reparsed, p);
        assert_eq!(
            reparsed.iter_field_lines("SHA256").unwrap().collect::<Vec<_>>(),
            vec!["abc 1 a", "def 22 b/c"]
        );

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            ControlFile::parse_str("no colon here\n"),
            Err(RepositoryError::ControlParseError(_))
        ));
        assert!(matches!(
            ControlFile::parse_str(" leading continuation\n"),
            Err(RepositoryError::ControlParseError(_))
        ));
    }
}
