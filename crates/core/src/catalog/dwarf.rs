use std::collections::HashMap;
use std::fs;
use std::path::Path;

use gimli::{AttributeValue, DebuggingInformationEntry, Dwarf, EndianSlice, EntriesTreeNode, RunTimeEndian, Unit, UnitOffset};
use log::{debug, info, trace, warn};
use object::{Object, ObjectSection, ObjectSymbol};
use regex::Regex;

use super::symbols::{decode_tag_symbol, TagSymbol};
use super::TypeCatalog;
use crate::consts::VTABLE_ADDRESS_POINT;
use crate::error::LensError;
use crate::models::{ClassLayout, FieldLayout, MethodEntry, ScalarEncoding, TypeDescriptor};

type Slice<'a> = EndianSlice<'a, RunTimeEndian>;

const MAX_TYPE_REF_DEPTH: usize = 16;

fn dwarf_error(e: gimli::Error) -> LensError {
    LensError::DebugInfoError(e.to_string())
}

/// Where an out-of-line member function definition lives
struct Definition {
    address: u64,
    file: Option<String>,
    line: Option<u32>,
}

#[derive(Default)]
struct PendingTypes {
    types: HashMap<String, TypeDescriptor>,
    /// ObjC methods are emitted as top-level subprograms, not inside their class
    objc_methods: Vec<(String, MethodEntry)>,
    /// Member function declarations of the current unit: class and method index
    declarations: HashMap<UnitOffset, (String, usize)>,
    definitions: Vec<(UnitOffset, Definition)>,
}

impl PendingTypes {
    fn insert_type(&mut self, descriptor: TypeDescriptor) {
        // one definition per class is enough; later units repeat it
        self.types.entry(descriptor.name.clone()).or_insert(descriptor);
    }

    /// Gives member declarations the address and entry line of their definitions.
    /// Unit offsets are only meaningful within one unit, so this runs per unit.
    fn attach_definitions(&mut self) {
        for (declaration, definition) in self.definitions.drain(..) {
            let Some((class_name, index)) = self.declarations.get(&declaration) else {
                trace!("Definition at {:?} has no member declaration", declaration);
                continue;
            };
            let Some(method) = self
                .types
                .get_mut(class_name)
                .and_then(|t| t.as_class_mut())
                .and_then(|layout| layout.methods.get_mut(*index))
            else {
                continue;
            };
            if method.address.is_some() {
                continue;
            }

            method.address = Some(definition.address);
            if definition.line.is_some() {
                method.line = definition.line;
                method.file = definition.file;
            }
        }
        self.declarations.clear();
    }
}

/// One compilation unit plus what it takes to name and locate its entries
struct UnitContext<'u, 'a> {
    dwarf: &'u Dwarf<Slice<'a>>,
    unit: &'u Unit<Slice<'a>>,
    /// `ns::Class` names for classes declared inside namespaces or other classes
    scoped_names: HashMap<UnitOffset, String>,
    /// First line-table row at each address: file index and line
    lines: HashMap<u64, (u64, u32)>,
}

impl<'u, 'a> UnitContext<'u, 'a> {
    fn new(dwarf: &'u Dwarf<Slice<'a>>, unit: &'u Unit<Slice<'a>>) -> Result<Self, LensError> {
        let mut context = Self {
            dwarf,
            unit,
            scoped_names: HashMap::new(),
            lines: HashMap::new(),
        };
        context.collect_scoped_names()?;
        context.collect_lines()?;
        Ok(context)
    }

    fn collect_scoped_names(&mut self) -> Result<(), LensError> {
        let mut scopes: Vec<(isize, String)> = Vec::new();
        let mut depth = 0isize;
        let unit = self.unit;
        let mut cursor = unit.entries();

        while let Some((delta, entry)) = cursor.next_dfs().map_err(dwarf_error)? {
            depth += delta;
            while scopes.last().is_some_and(|(scope_depth, _)| *scope_depth >= depth) {
                scopes.pop();
            }

            let tag = entry.tag();
            if !matches!(
                tag,
                gimli::DW_TAG_namespace | gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type
            ) {
                continue;
            }
            // anonymous scopes add nothing to the name
            let Some(name) = self.entry_name(entry)? else {
                continue;
            };

            let qualified = match scopes.last() {
                Some((_, outer)) => {
                    let qualified = format!("{}::{}", outer, name);
                    if tag != gimli::DW_TAG_namespace {
                        self.scoped_names.insert(entry.offset(), qualified.clone());
                    }
                    qualified
                }
                None => name,
            };
            scopes.push((depth, qualified));
        }
        Ok(())
    }

    fn collect_lines(&mut self) -> Result<(), LensError> {
        let Some(program) = self.unit.line_program.clone() else {
            return Ok(());
        };

        let mut rows = program.rows();
        while let Some((_, row)) = rows.next_row().map_err(dwarf_error)? {
            if row.end_sequence() {
                continue;
            }
            let Some(line) = row.line().and_then(|line| u32::try_from(line.get()).ok()) else {
                continue;
            };
            self.lines.entry(row.address()).or_insert((row.file_index(), line));
        }
        trace!("Line table has {} entry addresses", self.lines.len());
        Ok(())
    }

    fn entry_name(
        &self,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> Result<Option<String>, LensError> {
        match entry.attr_value(gimli::DW_AT_name).map_err(dwarf_error)? {
            Some(value) => {
                let name = self.dwarf.attr_string(self.unit, value).map_err(dwarf_error)?;
                Ok(Some(name.to_string_lossy().into_owned()))
            }
            None => Ok(None),
        }
    }

    /// Type name as the catalog knows it, namespace included
    fn qualified_name(
        &self,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> Result<Option<String>, LensError> {
        match self.scoped_names.get(&entry.offset()) {
            Some(name) => Ok(Some(name.clone())),
            None => self.entry_name(entry),
        }
    }

    fn file_name(&self, index: u64) -> Option<String> {
        let program = self.unit.line_program.as_ref()?;
        let file = program.header().file(index)?;
        let path = self.dwarf.attr_string(self.unit, file.path_name()).ok()?;
        Some(path.to_string_lossy().into_owned())
    }

    /// Name of the type referenced by the entry's DW_AT_type
    fn type_name(
        &self,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
        depth: usize,
    ) -> Result<Option<String>, LensError> {
        match entry.attr_value(gimli::DW_AT_type).map_err(dwarf_error)? {
            Some(AttributeValue::UnitRef(offset)) => self.name_at(offset, depth),
            _ => Ok(None),
        }
    }

    fn name_at(&self, offset: UnitOffset, depth: usize) -> Result<Option<String>, LensError> {
        if depth > MAX_TYPE_REF_DEPTH {
            return Ok(None);
        }

        let entry = self.unit.entry(offset).map_err(dwarf_error)?;
        match entry.tag() {
            gimli::DW_TAG_pointer_type => {
                let pointee = self
                    .type_name(&entry, depth + 1)?
                    .unwrap_or_else(|| "void".to_string());
                Ok(Some(TypeDescriptor::pointer_to(&pointee).name))
            }
            gimli::DW_TAG_const_type | gimli::DW_TAG_volatile_type | gimli::DW_TAG_restrict_type => {
                self.type_name(&entry, depth + 1)
            }
            gimli::DW_TAG_typedef => match self.entry_name(&entry)? {
                Some(name) => Ok(Some(name)),
                None => self.type_name(&entry, depth + 1),
            },
            _ => self.qualified_name(&entry),
        }
    }

    /// Code address of a subprogram, if it has one
    fn low_pc(&self, entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>) -> Result<Option<u64>, LensError> {
        match entry.attr_value(gimli::DW_AT_low_pc).map_err(dwarf_error)? {
            Some(AttributeValue::Addr(address)) => Ok(Some(address)),
            Some(AttributeValue::DebugAddrIndex(index)) => self
                .dwarf
                .address(self.unit, index)
                .map(Some)
                .map_err(dwarf_error),
            _ => Ok(None),
        }
    }

    /// Declared file and line of an entry
    fn decl_location(
        &self,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> Result<(Option<String>, Option<u32>), LensError> {
        let line = entry
            .attr_value(gimli::DW_AT_decl_line)
            .map_err(dwarf_error)?
            .and_then(|v| v.udata_value())
            .and_then(|v| u32::try_from(v).ok());

        let file_index = match entry.attr_value(gimli::DW_AT_decl_file).map_err(dwarf_error)? {
            Some(AttributeValue::FileIndex(index)) => Some(index),
            Some(other) => other.udata_value(),
            None => None,
        };
        Ok((file_index.and_then(|index| self.file_name(index)), line))
    }

    /// File and line of the first instruction at `address`, from the line table
    fn entry_location(&self, address: u64) -> Option<(Option<String>, u32)> {
        let (file_index, line) = self.lines.get(&address)?;
        Some((self.file_name(*file_index), *line))
    }
}

/// Reads class layouts and identity-tag symbols out of an object file's DWARF
pub struct DwarfTypeLoader<'a> {
    data: &'a [u8],
    objc_method: Regex,
}

impl<'a> DwarfTypeLoader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, LensError> {
        let objc_method = Regex::new(
            r"^[-+]\[(?P<class>[A-Za-z_][A-Za-z0-9_]*)(?:\([^)]*\))? (?P<selector>[^\]]+)\]$",
        )
        .map_err(|e| LensError::DebugInfoError(e.to_string()))?;

        Ok(Self { data, objc_method })
    }

    /// Loads every complete class/struct and base type into `catalog`, then registers
    /// identity tags for class-object and vtable symbols. Returns the number of types added.
    pub fn load_into(&self, catalog: &mut TypeCatalog) -> Result<usize, LensError> {
        info!("Loading types from debug info ({} bytes)", self.data.len());

        let file = object::File::parse(self.data)
            .map_err(|e| LensError::DebugInfoError(e.to_string()))?;
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> Result<Slice<'a>, gimli::Error> {
            let data = match file.section_by_name(id.name()) {
                Some(section) => {
                    trace!("Found section: {}", id.name());
                    section.data().unwrap_or(&[][..])
                }
                None => &[][..],
            };
            Ok(EndianSlice::new(data, endian))
        };

        let dwarf = Dwarf::load(load_section).map_err(dwarf_error)?;

        let mut pending = PendingTypes::default();
        let mut units = dwarf.units();
        let mut unit_count = 0;
        while let Some(header) = units.next().map_err(dwarf_error)? {
            unit_count += 1;
            let unit = match dwarf.unit(header) {
                Ok(unit) => unit,
                Err(e) => {
                    warn!("Skipping unparsable unit #{}: {}", unit_count, e);
                    continue;
                }
            };

            let context = UnitContext::new(&dwarf, &unit)?;
            let mut tree = unit.entries_tree(None).map_err(dwarf_error)?;
            let root = tree.root().map_err(dwarf_error)?;
            self.collect_children(&context, root, &mut pending)?;
            pending.attach_definitions();
        }

        if unit_count == 0 {
            warn!("No DWARF units found; only symbol tags will be available");
        }

        for (class_name, method) in pending.objc_methods.drain(..) {
            match pending.types.get_mut(&class_name).and_then(|t| t.as_class_mut()) {
                Some(layout) => layout.methods.push(method),
                None => trace!("Method {} for unknown class {}", method.selector, class_name),
            }
        }

        let type_count = pending.types.len();
        for (_, descriptor) in pending.types.drain() {
            catalog.register_type(descriptor);
        }

        let tag_count = self.register_symbol_tags(&file, catalog);
        info!(
            "Loaded {} types and {} identity tags from {} units",
            type_count, tag_count, unit_count
        );

        Ok(type_count)
    }

    fn register_symbol_tags(&self, file: &object::File<'a>, catalog: &mut TypeCatalog) -> usize {
        let mut count = 0;
        for symbol in file.symbols() {
            if symbol.is_undefined() {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            let Some(tag_symbol) = decode_tag_symbol(name) else {
                continue;
            };

            if catalog.lookup_by_name(tag_symbol.class_name()).is_none() {
                trace!("No layout for {}, skipping its tag", tag_symbol);
                continue;
            }

            let tag = match &tag_symbol {
                TagSymbol::ObjcClass(_) => symbol.address(),
                TagSymbol::Vtable(_) => symbol.address() + VTABLE_ADDRESS_POINT,
            };
            debug!("Tag 0x{:x} is the {}", tag, tag_symbol);
            catalog.register_tag(tag, tag_symbol.class_name(), 0);
            count += 1;
        }
        count
    }

    fn collect_children(
        &self,
        cx: &UnitContext<'_, 'a>,
        node: EntriesTreeNode<'_, '_, '_, Slice<'a>>,
        pending: &mut PendingTypes,
    ) -> Result<(), LensError> {
        let mut children = node.children();
        while let Some(child) = children.next().map_err(dwarf_error)? {
            match child.entry().tag() {
                gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type => {
                    self.extract_class(cx, child, pending)?;
                }
                gimli::DW_TAG_base_type => {
                    if let Some(descriptor) = self.extract_base_type(cx, child.entry())? {
                        pending.insert_type(descriptor);
                    }
                }
                gimli::DW_TAG_subprogram => {
                    let entry = child.entry();
                    if let Some((declaration, definition)) = self.extract_definition(cx, entry)? {
                        pending.definitions.push((declaration, definition));
                    } else if let Some(method) = self.extract_objc_method(cx, entry)? {
                        pending.objc_methods.push(method);
                    }
                }
                gimli::DW_TAG_namespace => {
                    self.collect_children(cx, child, pending)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn extract_class(
        &self,
        cx: &UnitContext<'_, 'a>,
        node: EntriesTreeNode<'_, '_, '_, Slice<'a>>,
        pending: &mut PendingTypes,
    ) -> Result<(), LensError> {
        let (name, size, is_declaration) = {
            let entry = node.entry();
            let name = cx.qualified_name(entry)?;
            let size = entry
                .attr_value(gimli::DW_AT_byte_size)
                .map_err(dwarf_error)?
                .and_then(|v| v.udata_value());
            let is_declaration = matches!(
                entry.attr_value(gimli::DW_AT_declaration).map_err(dwarf_error)?,
                Some(AttributeValue::Flag(true))
            );
            (name, size, is_declaration)
        };

        // anonymous or forward-declared: nothing to resolve against
        let Some(name) = name else {
            return Ok(());
        };
        if is_declaration {
            return Ok(());
        }

        let mut layout = ClassLayout::default();
        let mut children = node.children();
        while let Some(child) = children.next().map_err(dwarf_error)? {
            let entry = child.entry();
            match entry.tag() {
                gimli::DW_TAG_member => {
                    let Some(field_name) = cx.entry_name(entry)? else {
                        continue;
                    };
                    // static members have no location
                    let Some(offset) = entry
                        .attr_value(gimli::DW_AT_data_member_location)
                        .map_err(dwarf_error)?
                        .and_then(|v| v.udata_value())
                    else {
                        continue;
                    };
                    let type_name = cx.type_name(entry, 0)?.unwrap_or_else(|| "void".to_string());

                    if field_name == "isa" || field_name.starts_with("_vptr") {
                        layout.identity_tag_offset = Some(offset);
                    }

                    layout.fields.push(FieldLayout {
                        name: field_name,
                        offset,
                        type_name,
                    });
                }
                gimli::DW_TAG_inheritance => {
                    layout.superclass = cx.type_name(entry, 0)?;
                }
                gimli::DW_TAG_subprogram => {
                    if let Some(selector) = cx.entry_name(entry)? {
                        pending
                            .declarations
                            .insert(entry.offset(), (name.clone(), layout.methods.len()));
                        layout.methods.push(self.method_entry(cx, entry, selector)?);
                    }
                }
                gimli::DW_TAG_structure_type | gimli::DW_TAG_class_type => {
                    self.extract_class(cx, child, pending)?;
                }
                _ => {}
            }
        }

        debug!("Extracted class: {}", name);
        pending.insert_type(TypeDescriptor::class(&name, size.unwrap_or(0), layout));
        Ok(())
    }

    fn extract_base_type(
        &self,
        cx: &UnitContext<'_, 'a>,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> Result<Option<TypeDescriptor>, LensError> {
        let Some(name) = cx.entry_name(entry)? else {
            return Ok(None);
        };
        let size = entry
            .attr_value(gimli::DW_AT_byte_size)
            .map_err(dwarf_error)?
            .and_then(|v| v.udata_value())
            .unwrap_or(0);

        let encoding = match entry.attr_value(gimli::DW_AT_encoding).map_err(dwarf_error)? {
            Some(AttributeValue::Encoding(gimli::DW_ATE_signed))
            | Some(AttributeValue::Encoding(gimli::DW_ATE_signed_char)) => ScalarEncoding::Signed,
            Some(AttributeValue::Encoding(gimli::DW_ATE_unsigned))
            | Some(AttributeValue::Encoding(gimli::DW_ATE_unsigned_char)) => ScalarEncoding::Unsigned,
            Some(AttributeValue::Encoding(gimli::DW_ATE_float)) => ScalarEncoding::Float,
            Some(AttributeValue::Encoding(gimli::DW_ATE_boolean)) => ScalarEncoding::Bool,
            _ => {
                trace!("Unsupported encoding for base type {}", name);
                return Ok(None);
            }
        };

        Ok(Some(TypeDescriptor::scalar(&name, size, encoding)))
    }

    /// An out-of-line definition of a member function, either directly
    /// (`DW_AT_specification`) or as a concrete instance of one (`DW_AT_abstract_origin`)
    fn extract_definition(
        &self,
        cx: &UnitContext<'_, 'a>,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> Result<Option<(UnitOffset, Definition)>, LensError> {
        let Some(address) = cx.low_pc(entry)? else {
            return Ok(None);
        };

        let declaration = match entry.attr_value(gimli::DW_AT_specification).map_err(dwarf_error)? {
            Some(AttributeValue::UnitRef(offset)) => Some(offset),
            _ => match entry.attr_value(gimli::DW_AT_abstract_origin).map_err(dwarf_error)? {
                Some(AttributeValue::UnitRef(origin)) => {
                    let origin = cx.unit.entry(origin).map_err(dwarf_error)?;
                    match origin.attr_value(gimli::DW_AT_specification).map_err(dwarf_error)? {
                        Some(AttributeValue::UnitRef(offset)) => Some(offset),
                        _ => None,
                    }
                }
                _ => None,
            },
        };
        let Some(declaration) = declaration else {
            return Ok(None);
        };

        let (file, line) = match cx.entry_location(address) {
            Some((file, line)) => (file, Some(line)),
            None => cx.decl_location(entry)?,
        };
        trace!("Definition of {:?} at 0x{:x}", declaration, address);
        Ok(Some((declaration, Definition { address, file, line })))
    }

    fn extract_objc_method(
        &self,
        cx: &UnitContext<'_, 'a>,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
    ) -> Result<Option<(String, MethodEntry)>, LensError> {
        let Some(name) = cx.entry_name(entry)? else {
            return Ok(None);
        };
        let Some((class_name, selector)) = self.parse_objc_method_name(&name) else {
            return Ok(None);
        };

        let method = self.method_entry(cx, entry, selector)?;
        Ok(Some((class_name, method)))
    }

    pub fn parse_objc_method_name(&self, name: &str) -> Option<(String, String)> {
        let caps = self.objc_method.captures(name)?;
        Some((caps["class"].to_string(), caps["selector"].to_string()))
    }

    /// The entry line comes from the line table when the method has code,
    /// otherwise from its declaration
    fn method_entry(
        &self,
        cx: &UnitContext<'_, 'a>,
        entry: &DebuggingInformationEntry<'_, '_, Slice<'a>>,
        selector: String,
    ) -> Result<MethodEntry, LensError> {
        let address = cx.low_pc(entry)?;
        let (file, line) = match address.and_then(|address| cx.entry_location(address)) {
            Some((file, line)) => (file, Some(line)),
            None => cx.decl_location(entry)?,
        };

        Ok(MethodEntry {
            selector,
            address,
            file,
            line,
        })
    }
}

/// Reads an object file and loads its debug info into `catalog`
pub fn load_catalog_from_file(path: &Path, catalog: &mut TypeCatalog) -> Result<usize, LensError> {
    let data = fs::read(path)?;
    DwarfTypeLoader::new(&data)?.load_into(catalog)
}
