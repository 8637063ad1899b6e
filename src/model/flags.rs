use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;     // 	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    // 	Declared private; usable only within the defining class.
        const PROTECTED = 0x0004;  // 	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;     // 	Declared static.
        const FINAL = 0x0010;      // 	Declared final; never directly assigned to after object construction.
        const VOLATILE = 0x0040;   // 	Declared volatile; cannot be cached.
        const TRANSIENT = 0x0080;  // 	Declared transient; not written or read by a persistent object manager.
        const SYNTHETIC = 0x1000;  // 	Declared synthetic; not present in the source code.
        const ENUM = 0x4000;       // 	Declared as an element of an enum.
    }
}

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;       // Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;      // Declared private; accessible only within the defining class.
        const PROTECTED = 0x0004;    // Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;       // Declared static.
        const FINAL = 0x0010;        // Declared final; must not be overridden.
        const SYNCHRONIZED = 0x0020; // Declared synchronized; invocation is wrapped by a monitor use.
        const BRIDGE = 0x0040;       // A bridge method, generated by the compiler.
        const VARARGS = 0x0080;      // Declared with variable number of arguments.
        const NATIVE = 0x0100;       // Declared native; implemented in a language other than Java.
        const ABSTRACT = 0x0400;     // Declared abstract; no implementation is provided.
        const STRICT = 0x0800;       // Declared strictfp; floating-point mode is FP-strict.
        const SYNTHETIC = 0x1000;    // Declared synthetic; not present in the source code.
    }
}

bitflags! {
    #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
    pub struct InnerClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;    //	Declared private; may not be accessed from outside its package.
        const PROTECTED = 0x0004;  //	Declared protected; may only be accessed within children.
        const STATIC = 0x0008;     //	Declared static.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
    }
}
