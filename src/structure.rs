//! Structure and coordinate file readers used for atom selection.
//!
//! Two formats are understood:
//!
//! - **PDB**: fixed-column `ATOM`/`HETATM` records. `MODEL`/`ENDMDL` blocks are
//!   read as successive frames of the same system; the topology comes from the
//!   first model.
//! - **XYZ**: an atom count line, a comment line, then `element x y z` lines.
//!   Several blocks in one file are read as successive frames.
//!
//! # Field selection
//!
//! PDB records carry per-atom annotation columns that are conventionally used
//! to flag atoms for a collective variable. A record is selected by
//! `(field, value)` when its field equals `value`; a `value` of exactly `0.0`
//! selects every record whose field is non-zero. Recognised fields are `O`
//! (occupancy), `B` (beta), `X`, `Y` and `Z`.

use crate::error::{ProxyError, ProxyResult};
use crate::types::{AtomPos, ResidueId};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

lazy_static! {
    static ref FLOAT_RE: String = r"[-+]?(?:\d+\.\d*|\.\d+|\d+)(?:[eE][-+]?\d+)?".to_string();

    // XYZ atom line: "C   0.000  1.397  0.000"
    static ref XYZ_ATOM_RE: Regex = Regex::new(&format!(
        r"^\s*([A-Za-z][A-Za-z]?)\s+({0})\s+({0})\s+({0})",
        *FLOAT_RE
    )).unwrap();
}

/// Canonical spelling of an element symbol: "CL" and "cl" become "Cl".
fn normalize_element(element: &str) -> String {
    let mut chars = element.trim().chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Default mass for elements missing from the table
pub const DEFAULT_MASS: f64 = 12.0;

/// Atomic mass of an element symbol (amu), in any letter case.
pub fn element_mass(element: &str) -> f64 {
    match normalize_element(element).as_str() {
        "H" => 1.008,
        "C" => 12.011,
        "N" => 14.007,
        "O" => 15.999,
        "S" => 32.06,
        "P" => 30.974,
        "F" => 18.998,
        "Cl" => 35.45,
        "Br" => 79.904,
        "I" => 126.904,
        "Na" => 22.990,
        "K" => 39.098,
        "Ca" => 40.078,
        "Mg" => 24.305,
        "Zn" => 65.38,
        "Fe" => 55.845,
        _ => DEFAULT_MASS,
    }
}

/// File format of a structure file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    /// Protein Data Bank
    Pdb,
    /// Plain XYZ coordinates
    Xyz,
}

impl StructureFormat {
    /// Guesses the format from the file extension; anything but `.xyz` is PDB.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xyz") => StructureFormat::Xyz,
            _ => StructureFormat::Pdb,
        }
    }
}

/// One atom of a structure file.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    /// Serial number as written in the file
    pub serial: i64,
    /// Atom name
    pub name: String,
    /// Residue name
    pub res_name: String,
    /// Chain identifier
    pub chain: String,
    /// Residue number
    pub res_seq: ResidueId,
    /// Segment identifier
    pub segment: String,
    /// Element symbol
    pub element: String,
    /// Position in the first frame
    pub position: AtomPos,
    /// Occupancy column
    pub occupancy: f64,
    /// Beta (temperature factor) column
    pub beta: f64,
}

impl AtomRecord {
    /// Mass derived from the element symbol.
    pub fn mass(&self) -> f64 {
        element_mass(&self.element)
    }
}

/// Annotation column used to select atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionField {
    /// Occupancy (`O`)
    Occupancy,
    /// Beta factor (`B`)
    Beta,
    /// x coordinate (`X`)
    X,
    /// y coordinate (`Y`)
    Y,
    /// z coordinate (`Z`)
    Z,
}

impl FromStr for SelectionField {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "O" | "OCC" | "OCCUPANCY" => Ok(SelectionField::Occupancy),
            "B" | "BETA" => Ok(SelectionField::Beta),
            "X" => Ok(SelectionField::X),
            "Y" => Ok(SelectionField::Y),
            "Z" => Ok(SelectionField::Z),
            _ => Err(ProxyError::Input(format!(
                "unsupported selection field \"{}\" (expected O, B, X, Y or Z)",
                s
            ))),
        }
    }
}

impl SelectionField {
    /// Parses an optional field name; an empty name means no filtering.
    pub fn parse_optional(name: &str) -> ProxyResult<Option<Self>> {
        if name.trim().is_empty() {
            Ok(None)
        } else {
            name.parse().map(Some)
        }
    }

    /// Value of this field for `record`.
    pub fn value(&self, record: &AtomRecord) -> f64 {
        match self {
            SelectionField::Occupancy => record.occupancy,
            SelectionField::Beta => record.beta,
            SelectionField::X => record.position.x,
            SelectionField::Y => record.position.y,
            SelectionField::Z => record.position.z,
        }
    }

    /// Returns true when `record` is selected by `target`.
    pub fn matches(&self, record: &AtomRecord, target: f64) -> bool {
        let v = self.value(record);
        if target == 0.0 {
            v != 0.0
        } else {
            v == target
        }
    }
}

/// Atoms and frames read from one structure file.
#[derive(Debug, Clone)]
pub struct Structure {
    /// Format the structure was read from
    pub format: StructureFormat,
    /// Atoms in file order (topology of the first frame)
    pub atoms: Vec<AtomRecord>,
    /// Positions of every frame; `frames[0]` matches `atoms`
    pub frames: Vec<Vec<AtomPos>>,
}

impl Structure {
    /// Reads a structure, choosing the parser from the file extension.
    pub fn read(path: &Path) -> ProxyResult<Self> {
        match StructureFormat::from_path(path) {
            StructureFormat::Pdb => read_pdb(path),
            StructureFormat::Xyz => read_xyz(path),
        }
    }

    /// Number of atoms.
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// 0-based indices of the atoms selected by `(field, value)`, in file order.
    ///
    /// An empty field name selects every atom. XYZ files carry no annotation
    /// columns, so any field filter on them is rejected.
    pub fn select(&self, field: &str, value: f64) -> ProxyResult<Vec<usize>> {
        let field = SelectionField::parse_optional(field)?;
        match field {
            None => Ok((0..self.atoms.len()).collect()),
            Some(_) if self.format == StructureFormat::Xyz => Err(ProxyError::Input(
                "XYZ files have no annotation columns to select atoms by".to_string(),
            )),
            Some(f) => Ok(self
                .atoms
                .iter()
                .enumerate()
                .filter(|(_, rec)| f.matches(rec, value))
                .map(|(i, _)| i)
                .collect()),
        }
    }

    /// Index of the atom with the given residue number, atom name and segment.
    ///
    /// An empty `segment` matches any segment.
    pub fn find_by_name(&self, residue: ResidueId, name: &str, segment: &str) -> Option<usize> {
        self.atoms.iter().position(|a| {
            a.res_seq == residue && a.name == name && (segment.is_empty() || a.segment == segment)
        })
    }
}

fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    line.get(start..end).map(str::trim).unwrap_or("")
}

fn parse_number<T: FromStr>(line: &str, start: usize, end: usize, what: &str, lineno: usize) -> ProxyResult<T> {
    column(line, start, end).parse().map_err(|_| {
        ProxyError::Parse(format!(
            "line {}: cannot read {} from \"{}\"",
            lineno,
            what,
            column(line, start, end)
        ))
    })
}

fn parse_atom_line(line: &str, lineno: usize) -> ProxyResult<AtomRecord> {
    if line.len() < 54 {
        return Err(ProxyError::Parse(format!(
            "line {}: ATOM record too short ({} columns)",
            lineno,
            line.len()
        )));
    }
    let name = column(line, 12, 16).to_string();
    let element = match column(line, 76, 78) {
        "" => name
            .chars()
            .find(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_string())
            .unwrap_or_default(),
        e => e.to_string(),
    };
    Ok(AtomRecord {
        serial: parse_number(line, 6, 11, "serial", lineno)?,
        name,
        res_name: column(line, 17, 20).to_string(),
        chain: column(line, 21, 22).to_string(),
        res_seq: parse_number(line, 22, 26, "residue number", lineno)?,
        segment: column(line, 72, 76).to_string(),
        element,
        position: AtomPos::new(
            parse_number(line, 30, 38, "x", lineno)?,
            parse_number(line, 38, 46, "y", lineno)?,
            parse_number(line, 46, 54, "z", lineno)?,
        ),
        occupancy: column(line, 54, 60).parse().unwrap_or(0.0),
        beta: column(line, 60, 66).parse().unwrap_or(0.0),
    })
}

/// Reads a PDB file; every `MODEL` block becomes one frame.
pub fn read_pdb(path: &Path) -> ProxyResult<Structure> {
    let content = fs::read_to_string(path).map_err(|source| ProxyError::File {
        path: path.display().to_string(),
        source,
    })?;
    parse_pdb(&content)
}

/// Parses PDB text; see [`read_pdb`].
pub fn parse_pdb(content: &str) -> ProxyResult<Structure> {
    let mut atoms: Vec<AtomRecord> = Vec::new();
    let mut frames: Vec<Vec<AtomPos>> = Vec::new();
    let mut current: Vec<AtomPos> = Vec::new();
    let mut first_model = true;

    fn finish_model(current: &mut Vec<AtomPos>, frames: &mut Vec<Vec<AtomPos>>) {
        if !current.is_empty() {
            frames.push(std::mem::take(current));
        }
    }

    for (i, line) in content.lines().enumerate() {
        let lineno = i + 1;
        let record = column(line, 0, 6);
        match record {
            "ATOM" | "HETATM" => {
                let atom = parse_atom_line(line, lineno)?;
                current.push(atom.position);
                if first_model {
                    atoms.push(atom);
                }
            }
            "ENDMDL" => {
                finish_model(&mut current, &mut frames);
                first_model = false;
            }
            "END" => break,
            _ => {}
        }
    }
    finish_model(&mut current, &mut frames);

    if atoms.is_empty() {
        return Err(ProxyError::Parse("no atoms found in PDB file".to_string()));
    }
    for (k, frame) in frames.iter().enumerate() {
        if frame.len() != atoms.len() {
            return Err(ProxyError::Parse(format!(
                "model {} has {} atoms, expected {}",
                k + 1,
                frame.len(),
                atoms.len()
            )));
        }
    }

    Ok(Structure {
        format: StructureFormat::Pdb,
        atoms,
        frames,
    })
}

/// Reads an XYZ file; consecutive blocks become frames.
pub fn read_xyz(path: &Path) -> ProxyResult<Structure> {
    let content = fs::read_to_string(path).map_err(|source| ProxyError::File {
        path: path.display().to_string(),
        source,
    })?;
    parse_xyz(&content)
}

/// Parses XYZ text; see [`read_xyz`].
pub fn parse_xyz(content: &str) -> ProxyResult<Structure> {
    let lines: Vec<&str> = content.lines().collect();
    let mut atoms: Vec<AtomRecord> = Vec::new();
    let mut frames: Vec<Vec<AtomPos>> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }
        let count: usize = lines[i].trim().parse().map_err(|_| {
            ProxyError::Parse(format!("line {}: expected atom count, got \"{}\"", i + 1, lines[i].trim()))
        })?;
        if i + 2 + count > lines.len() {
            return Err(ProxyError::Parse(format!(
                "frame starting at line {} declares {} atoms but the file ends early",
                i + 1,
                count
            )));
        }
        let mut frame = Vec::with_capacity(count);
        for (k, line) in lines[i + 2..i + 2 + count].iter().enumerate() {
            let lineno = i + 3 + k;
            let caps = XYZ_ATOM_RE.captures(line).ok_or_else(|| {
                ProxyError::Parse(format!("line {}: malformed XYZ atom line \"{}\"", lineno, line))
            })?;
            let pos = AtomPos::new(
                caps[2].parse().unwrap_or(0.0),
                caps[3].parse().unwrap_or(0.0),
                caps[4].parse().unwrap_or(0.0),
            );
            if frames.is_empty() {
                atoms.push(AtomRecord {
                    serial: (k + 1) as i64,
                    name: caps[1].to_string(),
                    res_name: String::new(),
                    chain: String::new(),
                    res_seq: 0,
                    segment: String::new(),
                    element: caps[1].to_string(),
                    position: pos,
                    occupancy: 0.0,
                    beta: 0.0,
                });
            }
            frame.push(pos);
        }
        if frame.len() != atoms.len() {
            return Err(ProxyError::Parse(format!(
                "XYZ frame {} has {} atoms, expected {}",
                frames.len() + 1,
                frame.len(),
                atoms.len()
            )));
        }
        frames.push(frame);
        i += 2 + count;
    }

    if atoms.is_empty() {
        return Err(ProxyError::Parse("no atoms found in XYZ file".to_string()));
    }
    Ok(Structure {
        format: StructureFormat::Xyz,
        atoms,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MODELS: &str = "\
MODEL        1
ATOM      1  N   ALA A   1       1.000   2.000   3.000  1.00  0.00      PROT N
ATOM      2  CA  ALA A   1       2.000   2.000   3.000  0.00  1.00      PROT C
ATOM      3  O   HOH W   2       5.000   5.000   5.000  1.00  2.00      SOLV O
ENDMDL
MODEL        2
ATOM      1  N   ALA A   1       1.500   2.000   3.000  1.00  0.00      PROT N
ATOM      2  CA  ALA A   1       2.500   2.000   3.000  0.00  1.00      PROT C
ATOM      3  O   HOH W   2       5.500   5.000   5.000  1.00  2.00      SOLV O
ENDMDL
END
";

    #[test]
    fn test_parse_pdb_models_as_frames() {
        let s = parse_pdb(TWO_MODELS).unwrap();
        assert_eq!(s.num_atoms(), 3);
        assert_eq!(s.num_frames(), 2);
        assert_eq!(s.atoms[1].name, "CA");
        assert_eq!(s.atoms[1].segment, "PROT");
        assert_eq!(s.atoms[2].res_seq, 2);
        assert_eq!(s.frames[1][0], AtomPos::new(1.5, 2.0, 3.0));
        assert!((s.atoms[2].mass() - 15.999).abs() < 1e-9);
    }

    #[test]
    fn test_two_letter_elements_in_upper_case() {
        let s = parse_pdb(concat!(
            "HETATM    1 CL    CL I   1      10.000  10.000  10.000  1.00  0.00          CL\n",
            "HETATM    2 NA    NA I   2      12.000  10.000  10.000  1.00  0.00          NA\n",
        ))
        .unwrap();
        assert_eq!(s.atoms[0].element, "CL");
        assert!((s.atoms[0].mass() - 35.45).abs() < 1e-9);
        assert!((s.atoms[1].mass() - 22.990).abs() < 1e-9);
        assert!((element_mass("mg") - 24.305).abs() < 1e-9);
        assert_eq!(element_mass(""), DEFAULT_MASS);
    }

    #[test]
    fn test_select_by_field() {
        let s = parse_pdb(TWO_MODELS).unwrap();
        assert_eq!(s.select("B", 0.0).unwrap(), vec![1, 2]);
        assert_eq!(s.select("B", 2.0).unwrap(), vec![2]);
        assert_eq!(s.select("O", 1.0).unwrap(), vec![0, 2]);
        assert_eq!(s.select("", 0.0).unwrap(), vec![0, 1, 2]);
        assert!(matches!(s.select("Q", 1.0), Err(ProxyError::Input(_))));
    }

    #[test]
    fn test_find_by_name() {
        let s = parse_pdb(TWO_MODELS).unwrap();
        assert_eq!(s.find_by_name(1, "CA", "PROT"), Some(1));
        assert_eq!(s.find_by_name(1, "CA", ""), Some(1));
        assert_eq!(s.find_by_name(1, "CA", "SOLV"), None);
    }

    #[test]
    fn test_mismatched_models_rejected() {
        let bad = "\
MODEL        1
ATOM      1  N   ALA A   1       1.000   2.000   3.000  1.00  0.00
ATOM      2  CA  ALA A   1       2.000   2.000   3.000  0.00  1.00
ENDMDL
MODEL        2
ATOM      1  N   ALA A   1       1.500   2.000   3.000  1.00  0.00
ENDMDL
";
        assert!(matches!(parse_pdb(bad), Err(ProxyError::Parse(_))));
    }

    #[test]
    fn test_parse_xyz_frames() {
        let xyz = "2\nwater fragment\nO 0.0 0.0 0.0\nH 0.96 0.0 0.0\n2\nsecond\nO 0.1 0.0 0.0\nH 1.06 0.0 0.0\n";
        let s = parse_xyz(xyz).unwrap();
        assert_eq!(s.format, StructureFormat::Xyz);
        assert_eq!(s.num_frames(), 2);
        assert_eq!(s.atoms[1].element, "H");
        assert_eq!(s.frames[1][1], AtomPos::new(1.06, 0.0, 0.0));
        assert!(s.select("B", 1.0).is_err());
        assert_eq!(s.select("", 0.0).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_truncated_xyz_rejected() {
        assert!(parse_xyz("3\ncomment\nO 0 0 0\n").is_err());
    }
}
