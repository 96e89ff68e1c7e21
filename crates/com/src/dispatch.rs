//! IDispatch access and VARIANT conversions for property values.

use std::mem::ManuallyDrop;

use axhost_core::error::{ObjectError, ObjectResult, DISP_E_MEMBERNOTFOUND};
use axhost_domain::{OleColor, PropertyValue};
use windows::core::{BSTR, GUID, HRESULT, PCWSTR};
use windows::Win32::Foundation::{VARIANT_FALSE, VARIANT_TRUE};
use windows::Win32::System::Com::{
    IDispatch, DISPATCH_METHOD, DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS,
};
use windows::Win32::System::Ole::DISPID_PROPERTYPUT;
use windows::Win32::System::Variant::{
    VARIANT, VT_BOOL, VT_BSTR, VT_EMPTY, VT_I2, VT_I4, VT_R4, VT_R8, VT_UI4,
};

use crate::object_error;

pub unsafe fn get_dispid(dispatch: &IDispatch, name: &str) -> windows::core::Result<i32> {
    let wide_name: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let names = [PCWSTR(wide_name.as_ptr())];
    let mut dispid = 0i32;
    dispatch.GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, 0, &mut dispid)?;
    Ok(dispid)
}

pub unsafe fn get_property(dispatch: &IDispatch, dispid: i32) -> ObjectResult<PropertyValue> {
    let params = DISPPARAMS::default();
    let mut result = VARIANT::default();
    dispatch
        .Invoke(
            dispid,
            &GUID::zeroed(),
            0,
            DISPATCH_PROPERTYGET,
            &params,
            Some(&mut result),
            None,
            None,
        )
        .map_err(object_error)?;
    from_variant(&result)
        .ok_or_else(|| ObjectError::new(DISP_E_MEMBERNOTFOUND, "unsupported variant type"))
}

pub unsafe fn put_property(
    dispatch: &IDispatch,
    dispid: i32,
    value: &PropertyValue,
) -> windows::core::Result<()> {
    let mut arg = to_variant(value);
    let mut named_arg = DISPID_PROPERTYPUT;
    let params = DISPPARAMS {
        rgvarg: &mut arg,
        rgdispidNamedArgs: &mut named_arg,
        cArgs: 1,
        cNamedArgs: 1,
    };
    dispatch.Invoke(
        dispid,
        &GUID::zeroed(),
        0,
        DISPATCH_PROPERTYPUT,
        &params,
        None,
        None,
        None,
    )
}

/// Call a method with no arguments.
pub unsafe fn invoke_method(dispatch: &IDispatch, name: &str) -> windows::core::Result<()> {
    let dispid = get_dispid(dispatch, name)?;
    let params = DISPPARAMS::default();
    dispatch.Invoke(
        dispid,
        &GUID::zeroed(),
        0,
        DISPATCH_METHOD,
        &params,
        None,
        None,
        None,
    )
}

pub fn to_variant(value: &PropertyValue) -> VARIANT {
    let mut variant = VARIANT::default();
    unsafe {
        let inner = &mut *variant.Anonymous.Anonymous;
        match value {
            PropertyValue::Empty => inner.vt = VT_EMPTY,
            PropertyValue::Bool(value) => {
                inner.vt = VT_BOOL;
                inner.Anonymous.boolVal = if *value { VARIANT_TRUE } else { VARIANT_FALSE };
            }
            PropertyValue::I32(value) => {
                inner.vt = VT_I4;
                inner.Anonymous.lVal = *value;
            }
            PropertyValue::F64(value) => {
                inner.vt = VT_R8;
                inner.Anonymous.dblVal = *value;
            }
            PropertyValue::String(value) => {
                inner.vt = VT_BSTR;
                inner.Anonymous.bstrVal = ManuallyDrop::new(BSTR::from(value.as_str()));
            }
            PropertyValue::Color(color) => {
                inner.vt = VT_UI4;
                inner.Anonymous.ulVal = color.0;
            }
        }
    }
    variant
}

/// `None` for variant types property values cannot carry.
pub fn from_variant(variant: &VARIANT) -> Option<PropertyValue> {
    unsafe {
        let inner = &*variant.Anonymous.Anonymous;
        let value = match inner.vt {
            VT_EMPTY => PropertyValue::Empty,
            VT_BOOL => PropertyValue::Bool(inner.Anonymous.boolVal == VARIANT_TRUE),
            VT_I2 => PropertyValue::I32(i32::from(inner.Anonymous.iVal)),
            VT_I4 => PropertyValue::I32(inner.Anonymous.lVal),
            VT_UI4 => PropertyValue::Color(OleColor(inner.Anonymous.ulVal)),
            VT_R4 => PropertyValue::F64(f64::from(inner.Anonymous.fltVal)),
            VT_R8 => PropertyValue::F64(inner.Anonymous.dblVal),
            VT_BSTR => PropertyValue::String((*inner.Anonymous.bstrVal).to_string()),
            _ => return None,
        };
        Some(value)
    }
}

/// Event arguments in declaration order.
///
/// COM stores arguments in reverse order (last argument at index 0).
pub unsafe fn arguments(params: *const DISPPARAMS) -> Vec<PropertyValue> {
    if params.is_null() {
        return Vec::new();
    }
    let params = &*params;
    (0..params.cArgs)
        .rev()
        .map(|index| {
            let arg = &*params.rgvarg.add(index as usize);
            from_variant(arg).unwrap_or(PropertyValue::Empty)
        })
        .collect()
}

pub const DISP_E_UNKNOWNNAME: HRESULT = HRESULT(0x8002_0006u32 as i32);
