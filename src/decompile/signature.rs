//! Parsers for the generic `Signature` attribute grammar (JVMS 4.7.9.1).

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, opt},
    error::Error,
    multi::{many0, many1},
    sequence::{delimited, pair, preceded},
    Err as BaseErr,
};

use super::descriptor::package_name;
use super::java_ast::{JavaType, PrimitiveType, TypeParameter};

type Err<'a> = BaseErr<Error<&'a str>>;
type ParseResult<'a, T> = Result<(&'a str, T), Err<'a>>;

/// A parsed class signature.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub super_class: JavaType,
    pub interfaces: Vec<JavaType>,
}

/// A parsed method signature.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
    pub throws: Vec<JavaType>,
}

pub fn parse_class_signature(sig: &str) -> Option<ClassSignature> {
    all_consuming(class_signature)(sig).ok().map(|(_, s)| s)
}

pub fn parse_method_signature(sig: &str) -> Option<MethodSignature> {
    all_consuming(method_signature)(sig).ok().map(|(_, s)| s)
}

/// Field signatures and local-variable-type-table entries.
pub fn parse_field_signature(sig: &str) -> Option<JavaType> {
    all_consuming(java_type)(sig).ok().map(|(_, t)| t)
}

fn identifier(input: &str) -> ParseResult<&str> {
    take_while1(|c: char| !matches!(c, '.' | ';' | '[' | '/' | '<' | '>' | ':'))(input)
}

fn base_type(input: &str) -> ParseResult<JavaType> {
    let (input, c) = one_of("BCDFIJSZ")(input)?;
    let prim = match c {
        'B' => PrimitiveType::Byte,
        'C' => PrimitiveType::Char,
        'D' => PrimitiveType::Double,
        'F' => PrimitiveType::Float,
        'I' => PrimitiveType::Int,
        'J' => PrimitiveType::Long,
        'S' => PrimitiveType::Short,
        _ => PrimitiveType::Boolean,
    };
    Ok((input, JavaType::Primitive(prim)))
}

fn type_variable(input: &str) -> ParseResult<JavaType> {
    let (input, _) = char('T')(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = char(';')(input)?;
    Ok((input, JavaType::TypeVariable(name.to_string())))
}

fn type_argument(input: &str) -> ParseResult<JavaType> {
    alt((
        map(char('*'), |_| JavaType::WildcardType {
            bound: None,
            is_upper: true,
        }),
        map(pair(one_of("+-"), reference_type), |(sign, ty)| JavaType::WildcardType {
            bound: Some(Box::new(ty)),
            is_upper: sign == '+',
        }),
        reference_type,
    ))(input)
}

fn type_arguments(input: &str) -> ParseResult<Vec<JavaType>> {
    delimited(char('<'), many1(type_argument), char('>'))(input)
}

fn class_type(input: &str) -> ParseResult<JavaType> {
    let (input, _) = char('L')(input)?;
    let (input, path) = take_while1(|c: char| !matches!(c, ';' | '<' | '.'))(input)?;
    let (input, outer_args) = opt(type_arguments)(input)?;
    let (input, suffixes) = many0(preceded(char('.'), pair(identifier, opt(type_arguments))))(input)?;
    let (input, _) = char(';')(input)?;

    let package = package_name(path).map(|p| p.replace('/', "."));
    let base = path.rsplit('/').next().unwrap_or(path);
    let mut name = base.replace('$', ".");
    let mut type_args = outer_args.unwrap_or_default();
    for (inner, args) in suffixes {
        name.push('.');
        name.push_str(inner);
        type_args = args.unwrap_or_default();
    }
    Ok((
        input,
        JavaType::ClassType {
            package,
            name,
            type_args,
        },
    ))
}

fn array_type(input: &str) -> ParseResult<JavaType> {
    let (input, _) = char('[')(input)?;
    let (input, inner) = java_type(input)?;
    Ok((input, JavaType::ArrayType(Box::new(inner))))
}

fn reference_type(input: &str) -> ParseResult<JavaType> {
    alt((class_type, type_variable, array_type))(input)
}

fn java_type(input: &str) -> ParseResult<JavaType> {
    alt((base_type, reference_type))(input)
}

fn return_type(input: &str) -> ParseResult<JavaType> {
    alt((map(char('V'), |_| JavaType::Void), java_type))(input)
}

fn type_parameter(input: &str) -> ParseResult<TypeParameter> {
    let (input, name) = identifier(input)?;
    let (input, _) = char(':')(input)?;
    let (input, class_bound) = opt(reference_type)(input)?;
    let (input, interface_bounds) = many0(preceded(char(':'), reference_type))(input)?;
    let mut bounds: Vec<JavaType> = class_bound.into_iter().filter(|b| !b.is_object()).collect();
    bounds.extend(interface_bounds);
    Ok((
        input,
        TypeParameter {
            name: name.to_string(),
            bounds,
        },
    ))
}

fn type_parameters(input: &str) -> ParseResult<Vec<TypeParameter>> {
    map(opt(delimited(char('<'), many1(type_parameter), char('>'))), Option::unwrap_or_default)(input)
}

fn class_signature(input: &str) -> ParseResult<ClassSignature> {
    let (input, type_parameters) = type_parameters(input)?;
    let (input, super_class) = class_type(input)?;
    let (input, interfaces) = many0(class_type)(input)?;
    Ok((
        input,
        ClassSignature {
            type_parameters,
            super_class,
            interfaces,
        },
    ))
}

fn method_signature(input: &str) -> ParseResult<MethodSignature> {
    let (input, type_parameters) = type_parameters(input)?;
    let (input, parameters) = delimited(char('('), many0(java_type), char(')'))(input)?;
    let (input, return_type) = return_type(input)?;
    let (input, throws) = many0(preceded(char('^'), alt((class_type, type_variable))))(input)?;
    Ok((
        input,
        MethodSignature {
            type_parameters,
            parameters,
            return_type,
            throws,
        },
    ))
}
