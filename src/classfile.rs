//! Binary unit reader.
//!
//! Decodes just enough of a class file to answer classpath lookups: the type's
//! own name and hierarchy, its member table, and for `module-info.class` the
//! full `Module` attribute. Everything else is skipped without being decoded.

use crate::annotations::ExternalAnnotationProvider;
use thiserror::Error;

/// File name of a module's self-descriptor unit.
pub const MODULE_INFO_CLASS: &str = "module-info.class";

/// Suffix carried by every binary type unit.
pub const CLASS_SUFFIX: &str = ".class";

const CLASS_MAGIC: u32 = 0xCAFE_BABE;
const ACC_INTERFACE: u16 = 0x0200;
const ACC_MODULE: u16 = 0x8000;
const ACC_OPEN: u16 = 0x0020;

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header {found:#010x}")]
    InvalidMagic { found: u32 },
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid UTF-8 string in constant pool: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),
    #[error("class file is not a module descriptor")]
    NotAModule,
    #[error("module-info missing Module attribute")]
    MissingModuleAttribute,
}

/// Field or method entry of a binary type, kept in raw descriptor form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

/// A binary type read from a module image.
#[derive(Debug, Clone)]
pub struct BinaryType {
    /// Internal (slash separated) name, e.g. `java/lang/String`.
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub major_version: u16,
    pub minor_version: u16,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    annotation_provider: Option<ExternalAnnotationProvider>,
}

impl BinaryType {
    /// Dotted fully qualified name.
    pub fn fqcn(&self) -> String {
        self.name.replace('/', ".")
    }

    /// Internal package name, empty for the default package.
    pub fn package(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map(|(package, _)| package)
            .unwrap_or("")
    }

    pub fn simple_name(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map(|(_, simple)| simple)
            .unwrap_or(&self.name)
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn annotation_provider(&self) -> Option<&ExternalAnnotationProvider> {
        self.annotation_provider.as_ref()
    }

    pub fn has_annotation_provider(&self) -> bool {
        self.annotation_provider.is_some()
    }

    pub(crate) fn set_annotation_provider(&mut self, provider: ExternalAnnotationProvider) {
        self.annotation_provider = Some(provider);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleRequirement {
    pub module: String,
    pub flags: u16,
    pub version: Option<String>,
}

/// An `exports` or `opens` directive. Empty `targets` means unqualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageExport {
    pub package: String,
    pub flags: u16,
    pub targets: Vec<String>,
}

impl PackageExport {
    pub fn is_qualified(&self) -> bool {
        !self.targets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceProvision {
    pub service: String,
    pub implementations: Vec<String>,
}

/// Declared module metadata parsed from `module-info.class`.
///
/// Package and type names are stored in dotted form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDescriptor {
    pub name: String,
    pub flags: u16,
    pub version: Option<String>,
    pub requires: Vec<ModuleRequirement>,
    pub exports: Vec<PackageExport>,
    pub opens: Vec<PackageExport>,
    pub uses: Vec<String>,
    pub provides: Vec<ServiceProvision>,
}

impl ModuleDescriptor {
    pub fn is_open(&self) -> bool {
        self.flags & ACC_OPEN != 0
    }

    pub fn requires_module(&self, module: &str) -> bool {
        self.requires.iter().any(|req| req.module == module)
    }

    /// Whether `package` is exported to every module.
    pub fn exports_package(&self, package: &str) -> bool {
        self.exports
            .iter()
            .any(|export| export.package == package && !export.is_qualified())
    }

    /// Whether `package` is readable from `module`, through an unqualified or
    /// a qualified export.
    pub fn exports_package_to(&self, package: &str, module: &str) -> bool {
        self.exports.iter().any(|export| {
            export.package == package
                && (!export.is_qualified() || export.targets.iter().any(|t| t == module))
        })
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<BinaryType, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    let (minor_version, major_version) = reader.read_header()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(pool.class_name(index)?);
    }

    let fields = read_members(&mut reader, &pool)?;
    let methods = read_members(&mut reader, &pool)?;

    let attributes_count = reader.read_u2()?;
    skip_attributes(&mut reader, attributes_count)?;

    let super_name = if super_class == 0 {
        None
    } else {
        Some(pool.class_name(super_class)?)
    };

    Ok(BinaryType {
        name: pool.class_name(this_class)?,
        super_name,
        interfaces,
        access_flags,
        major_version,
        minor_version,
        fields,
        methods,
        annotation_provider: None,
    })
}

pub fn parse_module_info(bytes: &[u8]) -> Result<ModuleDescriptor, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.read_header()?;
    let pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u2()?;
    if access_flags & ACC_MODULE == 0 {
        return Err(ClassParseError::NotAModule);
    }
    let _this_class = reader.read_u2()?;
    let _super_class = reader.read_u2()?;
    let interfaces_count = reader.read_u2()?;
    reader.skip(interfaces_count as usize * 2)?;
    read_members(&mut reader, &pool)?;
    read_members(&mut reader, &pool)?;

    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let body = reader.read_slice(length)?;
        if pool.utf8(name_index)? == "Module" {
            return read_module_attribute(&mut ClassReader::new(body), &pool);
        }
    }

    Err(ClassParseError::MissingModuleAttribute)
}

fn read_module_attribute(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<ModuleDescriptor, ClassParseError> {
    let name = pool.module_name(reader.read_u2()?)?;
    let flags = reader.read_u2()?;
    let version = pool.optional_utf8(reader.read_u2()?)?;

    let requires_count = reader.read_u2()?;
    let mut requires = Vec::with_capacity(requires_count as usize);
    for _ in 0..requires_count {
        let module = pool.module_name(reader.read_u2()?)?;
        let flags = reader.read_u2()?;
        let version = pool.optional_utf8(reader.read_u2()?)?;
        requires.push(ModuleRequirement {
            module,
            flags,
            version,
        });
    }

    let exports = read_package_directives(reader, pool)?;
    let opens = read_package_directives(reader, pool)?;

    let uses_count = reader.read_u2()?;
    let mut uses = Vec::with_capacity(uses_count as usize);
    for _ in 0..uses_count {
        uses.push(pool.class_name(reader.read_u2()?)?.replace('/', "."));
    }

    let provides_count = reader.read_u2()?;
    let mut provides = Vec::with_capacity(provides_count as usize);
    for _ in 0..provides_count {
        let service = pool.class_name(reader.read_u2()?)?.replace('/', ".");
        let with_count = reader.read_u2()?;
        let mut implementations = Vec::with_capacity(with_count as usize);
        for _ in 0..with_count {
            implementations.push(pool.class_name(reader.read_u2()?)?.replace('/', "."));
        }
        provides.push(ServiceProvision {
            service,
            implementations,
        });
    }

    Ok(ModuleDescriptor {
        name,
        flags,
        version,
        requires,
        exports,
        opens,
        uses,
        provides,
    })
}

fn read_package_directives(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<PackageExport>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut directives = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let package = pool.package_name(reader.read_u2()?)?.replace('/', ".");
        let flags = reader.read_u2()?;
        let targets_count = reader.read_u2()?;
        let mut targets = Vec::with_capacity(targets_count as usize);
        for _ in 0..targets_count {
            targets.push(pool.module_name(reader.read_u2()?)?);
        }
        directives.push(PackageExport {
            package,
            flags,
            targets,
        });
    }
    Ok(directives)
}

fn read_members(
    reader: &mut ClassReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<MemberInfo>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access_flags = reader.read_u2()?;
        let name = pool.utf8(reader.read_u2()?)?.to_string();
        let descriptor = pool.utf8(reader.read_u2()?)?.to_string();
        let attributes_count = reader.read_u2()?;
        skip_attributes(reader, attributes_count)?;
        members.push(MemberInfo {
            name,
            descriptor,
            access_flags,
        });
    }
    Ok(members)
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassParseError> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(String::from_utf8(reader.read_slice(length)?.to_vec())?)
                }
                3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // Long and double occupy two slots.
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    Constant::Unusable
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 | 16 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn optional_utf8(&self, index: u16) -> Result<Option<String>, ClassParseError> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(|value| Some(value.to_string()))
    }

    fn named(
        &self,
        index: u16,
        accept: fn(&Constant) -> Option<u16>,
    ) -> Result<String, ClassParseError> {
        let name_index =
            accept(self.get(index)?).ok_or(ClassParseError::InvalidConstantIndex { index })?;
        Ok(self.utf8(name_index)?.to_string())
    }

    fn class_name(&self, index: u16) -> Result<String, ClassParseError> {
        self.named(index, |constant| match constant {
            Constant::Class { name_index } => Some(*name_index),
            _ => None,
        })
    }

    fn package_name(&self, index: u16) -> Result<String, ClassParseError> {
        self.named(index, |constant| match constant {
            Constant::Package { name_index } | Constant::Class { name_index } => Some(*name_index),
            _ => None,
        })
    }

    fn module_name(&self, index: u16) -> Result<String, ClassParseError> {
        self.named(index, |constant| match constant {
            Constant::Module { name_index } => Some(*name_index),
            _ => None,
        })
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Checks the magic number and returns `(minor, major)`.
    fn read_header(&mut self) -> Result<(u16, u16), ClassParseError> {
        let magic = self.read_u4()?;
        if magic != CLASS_MAGIC {
            return Err(ClassParseError::InvalidMagic { found: magic });
        }
        let minor = self.read_u2()?;
        let major = self.read_u2()?;
        Ok((minor, major))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassParseError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
