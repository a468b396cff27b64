//! Идентичность сервисов: тип + опциональное имя.

use serde::{Deserialize, Serialize};
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Runtime дескриптор типа.
///
/// Сравнение и хеширование только по `TypeId`; имя хранится для отладки.
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    /// Скалярные значения (`bool`, числа, `char`, `()`) не имеют собственной
    /// идентичности, weak кэш для них бессмыслен
    has_independent_lifetime: bool,
}

impl TypeDescriptor {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            has_independent_lifetime: !is_scalar_value(TypeId::of::<T>()),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Короткое имя без пути модулей (`di::tests::Foo` -> `Foo`)
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }

    pub fn supports_weak_retention(&self) -> bool {
        self.has_independent_lifetime
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Ключ реестра: (тип, имя). Два ключа равны тогда и только тогда,
/// когда совпадают оба поля.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_descriptor: TypeDescriptor,
    name: Option<String>,
}

impl ServiceKey {
    pub fn of<T: Any>() -> Self {
        Self::new::<T>(None)
    }

    pub fn named<T: Any>(name: impl Into<String>) -> Self {
        Self::new::<T>(Some(name.into()))
    }

    pub fn new<T: Any>(name: Option<String>) -> Self {
        Self::from_descriptor(TypeDescriptor::of::<T>(), name)
    }

    pub fn from_descriptor(type_descriptor: TypeDescriptor, name: Option<String>) -> Self {
        Self {
            type_descriptor,
            name,
        }
    }

    /// Проверить, что ключ адресует тип `T` (имя не учитывается)
    pub fn represents<T: Any>(&self) -> bool {
        self.type_descriptor.id == TypeId::of::<T>()
    }

    pub fn type_descriptor(&self) -> &TypeDescriptor {
        &self.type_descriptor
    }

    pub fn type_id(&self) -> TypeId {
        self.type_descriptor.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_descriptor.name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn descriptor(&self) -> ServiceKeyDescriptor {
        ServiceKeyDescriptor {
            type_name: self.type_descriptor.short_name().to_string(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}(name: {})", self.type_descriptor.short_name(), name),
            None => write!(f, "{}", self.type_descriptor.short_name()),
        }
    }
}

/// Сериализуемая форма ключа для диагностики (TypeId не сериализуется)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceKeyDescriptor {
    pub type_name: String,
    pub name: Option<String>,
}

impl From<&ServiceKey> for ServiceKeyDescriptor {
    fn from(key: &ServiceKey) -> Self {
        key.descriptor()
    }
}

impl fmt::Display for ServiceKeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}(name: {})", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Type-erased экземпляр сервиса вместе с информацией о его реальном типе
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance {
            value: Arc::downgrade(&self.value),
            type_id: self.type_id,
            type_name: self.type_name,
        }
    }

    /// Один и тот же объект в памяти
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &short_type_name(self.type_name))
            .field("strong_count", &Arc::strong_count(&self.value))
            .finish()
    }
}

/// Слабая ссылка на экземпляр; не продлевает его жизнь
#[derive(Clone)]
pub struct WeakInstance {
    value: Weak<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.value.upgrade().map(|value| Instance {
            value,
            type_id: self.type_id,
            type_name: self.type_name,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.value.strong_count() > 0
    }
}

impl fmt::Debug for WeakInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakInstance")
            .field("type", &short_type_name(self.type_name))
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn is_scalar_value(id: TypeId) -> bool {
    [
        TypeId::of::<()>(),
        TypeId::of::<bool>(),
        TypeId::of::<char>(),
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
        TypeId::of::<f32>(),
        TypeId::of::<f64>(),
        TypeId::of::<&'static str>(),
    ]
    .contains(&id)
}

/// Отрезать путь модулей, сохранив generic параметры читаемыми
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base_end = full.find('<').unwrap_or(full.len());
    match full[..base_end].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
