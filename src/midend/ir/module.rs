use std::fmt::Display;

use serde::Serialize;

use super::function::Function;
use super::types::IrType;

/// A private byte-array global, used for interned string constants.
#[derive(Clone, Debug, Serialize)]
pub struct GlobalVar {
    pub name: String,
    pub ty: IrType,
    /// Raw bytes including the NUL terminator.
    pub init: Vec<u8>,
    pub unnamed_addr: bool,
    pub align: usize,
}

/// An external function declaration (printf).
#[derive(Clone, Debug, Serialize)]
pub struct ExternFn {
    pub name: String,
    pub ret_ty: IrType,
    pub arg_tys: Vec<IrType>,
    pub vararg: bool,
}

/// A compiled translation unit: globals, extern declarations, and
/// function definitions.
#[derive(Debug, Serialize)]
pub struct Module {
    pub name: String,
    pub globals: Vec<GlobalVar>,
    pub decls: Vec<ExternFn>,
    pub funcs: Vec<Function>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            globals: Vec::new(),
            decls: Vec::new(),
            funcs: Vec::new(),
        }
    }

    /// Adds a private, unnamed-address, 1-aligned NUL-terminated string
    /// global and returns its name.
    pub fn add_string_global(&mut self, text: &str) -> String {
        let name = if self.globals.is_empty() {
            ".str".to_string()
        } else {
            format!(".str.{}", self.globals.len())
        };
        let mut init = text.as_bytes().to_vec();
        init.push(0);
        let ty = IrType::array_of(IrType::I8, init.len());
        self.globals.push(GlobalVar {
            name: name.clone(),
            ty,
            init,
            unnamed_addr: true,
            align: 1,
        });
        name
    }

    pub fn declare_extern(&mut self, name: &str, ret_ty: IrType, arg_tys: Vec<IrType>, vararg: bool) {
        self.decls.push(ExternFn {
            name: name.to_string(),
            ret_ty,
            arg_tys,
            vararg,
        });
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.funcs.iter().find(|f| f.name == name)
    }

    /// Serialized form used by `-emit-bc`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", super::printer::print_module(self))
    }
}
